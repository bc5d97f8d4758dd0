// CSV loader - turns source files into FinancialRecords
//
// Two source layouts exist: exports with a header line naming the columns and
// bare positional dumps. The layout is decided once per file from its first
// line, then every row goes through the mapper for that layout.

use crate::error::{ParseError, RowError};
use crate::record::{parse_amount, FinancialRecord};
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Header names accepted for the date column, in lookup order
pub const DATE_COLUMNS: [&str; 2] = ["date", "record_date"];

/// Headerless rows need date, type, amount, description
pub const MIN_POSITIONAL_FIELDS: usize = 4;

// ============================================================================
// CORE TYPES
// ============================================================================

/// InputFormat - which layout a source file uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputFormat {
    /// First line names the columns
    Headered,
    /// Data starts on the first line, columns by position
    Headerless,
}

impl InputFormat {
    /// Classify a file from its first line.
    ///
    /// The file is headered when the first comma-separated token is one of
    /// [`DATE_COLUMNS`] (case-insensitive, surrounding quotes ignored).
    /// Expects the byte-order mark to be stripped already.
    pub fn detect(text: &str) -> Self {
        let first_line = text.lines().next().unwrap_or("");
        let token = first_line
            .split(',')
            .next()
            .unwrap_or("")
            .trim()
            .trim_matches('"')
            .trim();

        if DATE_COLUMNS
            .iter()
            .any(|name| token.eq_ignore_ascii_case(name))
        {
            InputFormat::Headered
        } else {
            InputFormat::Headerless
        }
    }

    pub fn name(&self) -> &str {
        match self {
            InputFormat::Headered => "headered",
            InputFormat::Headerless => "headerless",
        }
    }
}

/// What to do with a row that cannot become a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RowErrorPolicy {
    /// Stop everything before a single batch is sent
    #[default]
    AbortRun,
    /// Keep what the file produced so far, drop the rest of it
    AbortFile,
    /// Drop only the offending row
    SkipRow,
}

impl RowErrorPolicy {
    pub fn name(&self) -> &str {
        match self {
            RowErrorPolicy::AbortRun => "abort-run",
            RowErrorPolicy::AbortFile => "abort-file",
            RowErrorPolicy::SkipRow => "skip-row",
        }
    }
}

impl fmt::Display for RowErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RowErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort-run" => Ok(RowErrorPolicy::AbortRun),
            "abort-file" => Ok(RowErrorPolicy::AbortFile),
            "skip-row" => Ok(RowErrorPolicy::SkipRow),
            other => Err(format!(
                "unknown policy '{}' (expected abort-run, abort-file or skip-row)",
                other
            )),
        }
    }
}

/// Result of loading one source file
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub format: InputFormat,
    pub records: Vec<FinancialRecord>,
    /// Headerless rows with fewer than MIN_POSITIONAL_FIELDS fields
    pub short_rows: usize,
    /// Rows dropped under AbortFile / SkipRow
    pub rejected: Vec<RowError>,
    /// Required header column that was absent (file skipped)
    pub missing_column: Option<&'static str>,
    /// File was not read to the end
    pub truncated: bool,
}

impl FileReport {
    fn new(path: &Path, format: InputFormat) -> Self {
        FileReport {
            path: path.to_path_buf(),
            format,
            records: Vec::new(),
            short_rows: 0,
            rejected: Vec::new(),
            missing_column: None,
            truncated: false,
        }
    }

    pub fn summary(&self) -> String {
        let mut text = format!(
            "{}: {} records ({})",
            self.path.display(),
            self.records.len(),
            self.format.name()
        );
        if self.short_rows > 0 {
            text.push_str(&format!(", {} short rows skipped", self.short_rows));
        }
        if !self.rejected.is_empty() {
            text.push_str(&format!(", {} rows rejected", self.rejected.len()));
        }
        if let Some(column) = self.missing_column {
            text.push_str(&format!(", skipped: no '{}' column", column));
        } else if self.truncated {
            text.push_str(", stopped early");
        }
        text
    }
}

/// Records from every source file, in file-then-row order
#[derive(Debug, Default)]
pub struct LoadedRecords {
    pub files: Vec<FileReport>,
}

impl LoadedRecords {
    pub fn total_records(&self) -> usize {
        self.files.iter().map(|f| f.records.len()).sum()
    }

    pub fn total_rejected(&self) -> usize {
        self.files.iter().map(|f| f.rejected.len()).sum()
    }

    pub fn into_records(self) -> Vec<FinancialRecord> {
        self.files.into_iter().flat_map(|f| f.records).collect()
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

/// Column positions resolved from a header line
#[derive(Debug)]
struct HeaderIndex {
    date: Option<usize>,
    record_date: Option<usize>,
    record_type: usize,
    amount: usize,
    description: Option<usize>,
    category: Option<usize>,
}

impl HeaderIndex {
    /// Err carries the name of the first required column not found
    fn from_headers(headers: &StringRecord) -> Result<Self, &'static str> {
        let find = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

        let date = find(DATE_COLUMNS[0]);
        let record_date = find(DATE_COLUMNS[1]);
        if date.is_none() && record_date.is_none() {
            return Err("record_date");
        }

        Ok(HeaderIndex {
            date,
            record_date,
            record_type: find("type").ok_or("type")?,
            amount: find("amount").ok_or("amount")?,
            description: find("description"),
            category: find("category"),
        })
    }
}

enum RowMapper {
    Headered(HeaderIndex),
    Headerless,
}

impl RowMapper {
    /// Ok(None) means the row is too short to be data and is skipped
    fn map(&self, row: &StringRecord) -> Result<Option<FinancialRecord>, RowError> {
        let line = row.position().map(|p| p.line()).unwrap_or(0);
        match self {
            RowMapper::Headered(index) => map_headered_row(row, index, line).map(Some),
            RowMapper::Headerless => map_headerless_row(row, line),
        }
    }
}

fn map_headered_row(
    row: &StringRecord,
    index: &HeaderIndex,
    line: u64,
) -> Result<FinancialRecord, RowError> {
    let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i));

    // "date" wins when both columns are present and filled
    let record_date = [index.date, index.record_date]
        .into_iter()
        .filter_map(cell)
        .find(|value| !value.is_empty())
        .ok_or(RowError::MissingField {
            line,
            field: "record_date",
        })?;

    let record_type = row.get(index.record_type).ok_or(RowError::MissingField {
        line,
        field: "type",
    })?;

    let amount = row.get(index.amount).ok_or(RowError::MissingField {
        line,
        field: "amount",
    })?;
    let amount = parse_amount(amount, line)?;

    Ok(
        FinancialRecord::new(record_date.to_string(), record_type.to_string(), amount)
            .with_description(cell(index.description).unwrap_or(""))
            .with_category(cell(index.category).unwrap_or("")),
    )
}

fn map_headerless_row(row: &StringRecord, line: u64) -> Result<Option<FinancialRecord>, RowError> {
    if row.len() < MIN_POSITIONAL_FIELDS {
        return Ok(None);
    }
    if row[0].trim().is_empty() {
        return Err(RowError::MissingField {
            line,
            field: "record_date",
        });
    }

    let amount = parse_amount(&row[2], line)?;
    let record = FinancialRecord::new(row[0].to_string(), row[1].to_string(), amount)
        .with_description(&row[3])
        .with_category(row.get(4).unwrap_or(""));

    Ok(Some(record))
}

// ============================================================================
// LOADING
// ============================================================================

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Parse the contents of one source file.
///
/// `path` is only used for reporting. Under `RowErrorPolicy::AbortRun` the
/// first bad row is returned as `ParseError::Row`.
pub fn parse_text(
    path: &Path,
    text: &str,
    policy: RowErrorPolicy,
) -> Result<FileReport, ParseError> {
    let text = strip_bom(text);
    let format = InputFormat::detect(text);
    let mut report = FileReport::new(path, format);

    let mut reader = ReaderBuilder::new()
        .has_headers(format == InputFormat::Headered)
        .flexible(true)
        .trim(Trim::Headers)
        .from_reader(text.as_bytes());

    let mapper = match format {
        InputFormat::Headered => {
            let headers = reader
                .headers()
                .map_err(|e| ParseError::Row {
                    path: path.to_path_buf(),
                    source: RowError::Csv(e),
                })?
                .clone();

            match HeaderIndex::from_headers(&headers) {
                Ok(index) => RowMapper::Headered(index),
                Err(column) if policy == RowErrorPolicy::AbortRun => {
                    return Err(ParseError::MissingColumn {
                        path: path.to_path_buf(),
                        column,
                    });
                }
                Err(column) => {
                    warn!(path = %path.display(), column, "header lacks required column, skipping file");
                    report.missing_column = Some(column);
                    report.truncated = true;
                    return Ok(report);
                }
            }
        }
        InputFormat::Headerless => RowMapper::Headerless,
    };

    for result in reader.records() {
        let mapped = result
            .map_err(RowError::from)
            .and_then(|row| mapper.map(&row));

        match mapped {
            Ok(Some(record)) => report.records.push(record),
            Ok(None) => {
                report.short_rows += 1;
                debug!(path = %path.display(), "skipping row with fewer than {} fields", MIN_POSITIONAL_FIELDS);
            }
            Err(err) => match policy {
                RowErrorPolicy::AbortRun => {
                    return Err(ParseError::Row {
                        path: path.to_path_buf(),
                        source: err,
                    });
                }
                RowErrorPolicy::AbortFile => {
                    warn!(path = %path.display(), error = %err, "bad row, ignoring rest of file");
                    report.rejected.push(err);
                    report.truncated = true;
                    break;
                }
                RowErrorPolicy::SkipRow => {
                    warn!(path = %path.display(), error = %err, "bad row, skipping");
                    report.rejected.push(err);
                }
            },
        }
    }

    let non_iso = report.records.iter().filter(|r| !r.has_iso_date()).count();
    if non_iso > 0 {
        warn!(path = %path.display(), count = non_iso, "records with non-ISO dates, sent as written");
    }

    Ok(report)
}

/// Read and parse one source file (UTF-8, optional BOM)
pub fn load_file(path: &Path, policy: RowErrorPolicy) -> Result<FileReport, ParseError> {
    let text = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let report = parse_text(path, &text, policy)?;
    info!(
        path = %path.display(),
        format = report.format.name(),
        records = report.records.len(),
        "loaded source file"
    );
    Ok(report)
}

/// Load every file in order. Stops at the first error the policy does not absorb.
pub fn load_files<P: AsRef<Path>>(
    paths: &[P],
    policy: RowErrorPolicy,
) -> Result<LoadedRecords, ParseError> {
    let mut loaded = LoadedRecords::default();
    for path in paths {
        loaded.files.push(load_file(path.as_ref(), policy)?);
    }
    Ok(loaded)
}
