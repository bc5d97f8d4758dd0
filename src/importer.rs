// Batch importer - sends loaded records to a table in fixed-size chunks
//
// Batches go out one at a time, in order. The first failing batch ends the
// run; batches already accepted stay in the table.

use crate::error::{ClientError, ParseError};
use crate::parser::{load_files, RowErrorPolicy};
use crate::record::{FinancialRecord, DEFAULT_TABLE};
use std::path::Path;
use tracing::{error, info};

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub table: String,
    pub batch_size: usize,
    pub policy: RowErrorPolicy,
}

impl Default for ImportSettings {
    fn default() -> Self {
        ImportSettings {
            table: DEFAULT_TABLE.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            policy: RowErrorPolicy::default(),
        }
    }
}

/// Anything that accepts a batch of records in one call
pub trait RecordSink {
    /// Insert one batch. Either the whole batch is accepted or an error is returned.
    fn insert_batch(&mut self, table: &str, records: &[FinancialRecord]) -> Result<(), ClientError>;

    /// Human-readable target name for logs
    fn describe(&self) -> String;
}

/// Number of insert calls needed for `total` records
pub fn batch_count(total: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    total.div_ceil(batch_size)
}

/// The batch that ended a run early
#[derive(Debug)]
pub struct BatchFailure {
    /// Zero-based index of the failing batch
    pub batch_index: usize,
    pub batch_len: usize,
    /// First record of the failing batch, for diagnostics
    pub first_record: Option<FinancialRecord>,
    pub error: ClientError,
}

#[derive(Debug)]
pub struct ImportReport {
    pub total: usize,
    pub inserted: usize,
    pub batches_sent: usize,
    pub failure: Option<BatchFailure>,
}

impl ImportReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.inserted == self.total
    }
}

/// Insert `records` into `table` in batches of `batch_size`.
///
/// Prints the running count after every accepted batch. On failure prints the
/// error and the first record of the failing batch, then stops.
pub fn import_records<S: RecordSink + ?Sized>(
    sink: &mut S,
    table: &str,
    records: &[FinancialRecord],
    batch_size: usize,
) -> ImportReport {
    let batch_size = batch_size.max(1);
    let mut report = ImportReport {
        total: records.len(),
        inserted: 0,
        batches_sent: 0,
        failure: None,
    };

    info!(
        target_db = %sink.describe(),
        table,
        total = records.len(),
        batches = batch_count(records.len(), batch_size),
        "starting import"
    );

    for (batch_index, batch) in records.chunks(batch_size).enumerate() {
        report.batches_sent += 1;

        match sink.insert_batch(table, batch) {
            Ok(()) => {
                report.inserted += batch.len();
                println!("✓ {} rows inserted", report.inserted);
            }
            Err(err) => {
                let first_record = batch.first().cloned();
                let sample = first_record
                    .as_ref()
                    .and_then(|r| serde_json::to_string(r).ok())
                    .unwrap_or_else(|| "None".to_string());

                println!("❌ Batch {} failed ({}): {}", batch_index + 1, err.kind(), err);
                println!("   First record of batch: {}", sample);
                error!(batch = batch_index + 1, kind = err.kind(), error = %err, "batch insert failed, stopping");

                report.failure = Some(BatchFailure {
                    batch_index,
                    batch_len: batch.len(),
                    first_record,
                    error: err,
                });
                break;
            }
        }
    }

    info!(inserted = report.inserted, total = report.total, "import finished");
    report
}

/// Load every source file, then insert the combined records.
///
/// Loading finishes before the first batch is sent, so a run aborted by a bad
/// row inserts nothing.
pub fn run_import<S, P>(
    sink: &mut S,
    paths: &[P],
    settings: &ImportSettings,
) -> Result<ImportReport, ParseError>
where
    S: RecordSink + ?Sized,
    P: AsRef<Path>,
{
    for path in paths {
        println!("📂 Reading {}...", path.as_ref().display());
    }
    let loaded = load_files(paths, settings.policy)?;
    for file in &loaded.files {
        println!("   {}", file.summary());
    }

    let records = loaded.into_records();
    println!(
        "\n💾 Inserting {} records in batches of {}...",
        records.len(),
        settings.batch_size
    );
    Ok(import_records(sink, &settings.table, &records, settings.batch_size))
}
