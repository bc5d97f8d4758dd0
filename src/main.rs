use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use finrec::importer::{batch_count, run_import, ImportSettings, RecordSink, DEFAULT_BATCH_SIZE};
use finrec::logging::{init_logging, LogFormat};
use finrec::migration::{Dialect, Migration, MigrationTarget};
use finrec::parser::{load_files, RowErrorPolicy};
use finrec::record::DEFAULT_TABLE;
use finrec::rest::{RestClient, WriteMode};
use finrec::{DatabaseConfig, LocalMirror};

/// Financial-record importer and campaign schema migrator
#[derive(Parser, Debug)]
#[command(name = "finrec")]
#[command(version, about)]
struct Cli {
    /// Log level override (trace, debug, info, warn, error); defaults to RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format (compact, pretty, json)
    #[arg(long, global = true, default_value_t = LogFormat::Compact)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Add the campaign guide columns (idempotent)
    Migrate {
        /// Print the SQL script instead of running it
        #[arg(long)]
        dry_run: bool,

        /// Apply to a local SQLite mirror instead of the hosted database
        #[arg(long, value_name = "PATH")]
        sqlite: Option<PathBuf>,
    },

    /// Load CSV files and insert their rows in batches
    Import {
        /// Source CSV files, processed in the order given
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Rows per insert call
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, value_parser = parse_batch_size)]
        batch_size: usize,

        /// Target table
        #[arg(long, default_value = DEFAULT_TABLE)]
        table: String,

        /// Bad-row handling: abort-run, abort-file or skip-row
        #[arg(long, default_value_t = RowErrorPolicy::AbortRun)]
        on_bad_row: RowErrorPolicy,

        /// Upsert on these comma-separated columns instead of plain insert
        #[arg(long, value_name = "COLS", value_delimiter = ',', conflicts_with = "sqlite")]
        upsert_on: Vec<String>,

        /// Parse and report without sending anything
        #[arg(long)]
        dry_run: bool,

        /// Insert into a local SQLite mirror instead of the hosted database
        #[arg(long, value_name = "PATH")]
        sqlite: Option<PathBuf>,
    },
}

fn parse_batch_size(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("batch size must be a positive integer, got '{}'", s)),
    }
}

fn main() -> ExitCode {
    // A missing .env is fine; the variables may already be exported
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.log_level.as_deref(), cli.log_format) {
        eprintln!("❌ {}", e);
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Command::Migrate { dry_run, sqlite } => run_migrate(dry_run, sqlite),
        Command::Import {
            files,
            batch_size,
            table,
            on_bad_row,
            upsert_on,
            dry_run,
            sqlite,
        } => {
            let settings = ImportSettings {
                table,
                batch_size,
                policy: on_bad_row,
            };
            let write_mode = if upsert_on.is_empty() {
                WriteMode::Insert
            } else {
                WriteMode::Upsert {
                    on_conflict: upsert_on,
                }
            };
            run_import_command(&files, &settings, write_mode, dry_run, sqlite)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            tracing::error!(error = %format!("{:#}", e), "run failed");
            ExitCode::FAILURE
        }
    }
}

fn remote_client(write_mode: WriteMode) -> Result<RestClient> {
    let config = DatabaseConfig::from_env().context("Database configuration incomplete")?;
    let client = RestClient::new(config)
        .context("Failed to build HTTP client")?
        .with_write_mode(write_mode);
    Ok(client)
}

fn run_migrate(dry_run: bool, sqlite: Option<PathBuf>) -> Result<()> {
    println!("🔧 Schema migration");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let migration = Migration::campaign_guide();

    if dry_run {
        let dialect = if sqlite.is_some() {
            Dialect::Sqlite
        } else {
            Dialect::Postgres
        };
        print!("{}", migration.render(dialect));
        println!("\n✓ Dry run: {} statements, nothing executed", migration.columns.len());
        return Ok(());
    }

    let mut target: Box<dyn MigrationTarget> = match &sqlite {
        Some(path) => Box::new(
            LocalMirror::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(remote_client(WriteMode::Insert)?),
    };

    match target.apply(&migration) {
        Ok(outcome) => {
            println!("✅ Migration succeeded!");
            println!("   {}", outcome.summary());
            Ok(())
        }
        Err(e) => {
            println!("❌ Migration failed ({}): {}", e.kind(), e);
            bail!("migration '{}' failed", migration.name)
        }
    }
}

fn run_import_command(
    files: &[PathBuf],
    settings: &ImportSettings,
    write_mode: WriteMode,
    dry_run: bool,
    sqlite: Option<PathBuf>,
) -> Result<()> {
    println!("🗄️  Import: CSV → {}", settings.table);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if dry_run {
        let loaded = load_files(files, settings.policy)?;
        for file in &loaded.files {
            println!("   {}", file.summary());
        }
        let total = loaded.total_records();
        println!(
            "\n✓ Dry run: {} records would be sent in {} batches of up to {}",
            total,
            batch_count(total, settings.batch_size),
            settings.batch_size
        );
        return Ok(());
    }

    let mut sink: Box<dyn RecordSink> = match &sqlite {
        Some(path) => Box::new(
            LocalMirror::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
        None => Box::new(remote_client(write_mode)?),
    };

    let report = run_import(sink.as_mut(), files, settings)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    match &report.failure {
        None => {
            println!("🎉 Import complete: {} of {} records inserted", report.inserted, report.total);
            Ok(())
        }
        Some(failure) => {
            println!(
                "⚠️  Import stopped at batch {}: {} of {} records inserted",
                failure.batch_index + 1,
                report.inserted,
                report.total
            );
            bail!("batch insert failed ({})", failure.error.kind())
        }
    }
}
