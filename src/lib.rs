// finrec - financial record importer and schema migrator
// Exposes all modules for use in the CLI and tests

pub mod config;
pub mod db;
pub mod error;
pub mod importer;
pub mod logging;
pub mod migration;
pub mod parser;
pub mod record;
pub mod rest;

// Re-export commonly used types
pub use config::DatabaseConfig;
pub use db::{
    LocalMirror,
    setup_database, insert_records, verify_count, get_all_records, apply_migration,
};
pub use error::{ClientError, ConfigError, ParseError, RowError};
pub use importer::{
    ImportReport, ImportSettings, BatchFailure, RecordSink,
    import_records, run_import, batch_count, DEFAULT_BATCH_SIZE,
};
pub use migration::{
    ColumnAddition, ColumnType, Dialect, Migration, MigrationOutcome, MigrationTarget,
};
pub use parser::{
    FileReport, InputFormat, LoadedRecords, RowErrorPolicy,
    load_file, load_files, parse_text,
};
pub use record::{FinancialRecord, parse_amount, DEFAULT_TABLE};
pub use rest::{RestClient, WriteMode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
