// Local SQLite mirror
//
// Same two tables as the hosted database, used as an offline target for both
// the importer and the migrator. Each batch is written in one transaction.

use crate::error::ClientError;
use crate::importer::RecordSink;
use crate::migration::{Dialect, Migration, MigrationOutcome, MigrationTarget};
use crate::record::FinancialRecord;
use rusqlite::{params, Connection};
use std::path::Path;
use tracing::{debug, info};

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS financial_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            record_date TEXT NOT NULL,
            type TEXT NOT NULL,
            amount REAL NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            category TEXT NOT NULL DEFAULT '',
            is_receivable BOOLEAN NOT NULL DEFAULT 0,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Base table the campaign migration extends
    conn.execute(
        "CREATE TABLE IF NOT EXISTS campaigns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_financial_records_date ON financial_records(record_date)",
        [],
    )?;

    Ok(())
}

/// Quote an identifier for interpolation into SQL
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Insert all records in a single transaction; nothing is kept if one fails
pub fn insert_records(
    conn: &Connection,
    table: &str,
    records: &[FinancialRecord],
) -> rusqlite::Result<usize> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {} (record_date, type, amount, description, category, is_receivable)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            quote_ident(table)
        ))?;

        for record in records {
            stmt.execute(params![
                record.record_date,
                record.record_type,
                record.amount,
                record.description,
                record.category,
                record.is_receivable,
            ])?;
        }
    }
    tx.commit()?;

    Ok(records.len())
}

pub fn verify_count(conn: &Connection, table: &str) -> rusqlite::Result<i64> {
    conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |row| row.get(0),
    )
}

/// Records in insertion order
pub fn get_all_records(conn: &Connection, table: &str) -> rusqlite::Result<Vec<FinancialRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT record_date, type, amount, description, category, is_receivable
         FROM {} ORDER BY id",
        quote_ident(table)
    ))?;

    let records = stmt
        .query_map([], |row| {
            Ok(FinancialRecord {
                record_date: row.get(0)?,
                record_type: row.get(1)?,
                amount: row.get(2)?,
                description: row.get(3)?,
                category: row.get(4)?,
                is_receivable: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

/// Column names of `table`, in declaration order
pub fn column_names(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

/// Add the migration's missing columns, leaving existing ones untouched
pub fn apply_migration(conn: &Connection, migration: &Migration) -> rusqlite::Result<MigrationOutcome> {
    let mut added = Vec::new();
    let mut already_present = Vec::new();

    for column in &migration.columns {
        let existing = column_names(conn, column.table)?;
        if existing.iter().any(|name| name.eq_ignore_ascii_case(column.name)) {
            debug!(table = column.table, column = column.name, "column already present");
            already_present.push(column.name.to_string());
            continue;
        }

        conn.execute(&column.render(Dialect::Sqlite), [])?;
        added.push(column.name.to_string());
    }

    Ok(MigrationOutcome::Applied {
        added,
        already_present,
    })
}

/// SQLite-backed target for imports and migrations
pub struct LocalMirror {
    conn: Connection,
    label: String,
}

impl LocalMirror {
    /// Open (or create) the database file and make sure the tables exist
    pub fn open(path: &Path) -> Result<Self, ClientError> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        info!(path = %path.display(), "opened local mirror");
        Ok(LocalMirror {
            conn,
            label: path.display().to_string(),
        })
    }

    pub fn open_in_memory() -> Result<Self, ClientError> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(LocalMirror {
            conn,
            label: ":memory:".to_string(),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl RecordSink for LocalMirror {
    fn insert_batch(&mut self, table: &str, records: &[FinancialRecord]) -> Result<(), ClientError> {
        insert_records(&self.conn, table, records)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.label)
    }
}

impl MigrationTarget for LocalMirror {
    fn apply(&mut self, migration: &Migration) -> Result<MigrationOutcome, ClientError> {
        info!(migration = migration.name, target_db = %self.describe(), "applying migration");
        Ok(apply_migration(&self.conn, migration)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::{import_records, run_import, ImportSettings};
    use crate::parser::{parse_text, RowErrorPolicy};
    use crate::record::DEFAULT_TABLE;

    fn create_test_record(date: &str, kind: &str, amount: f64, category: &str) -> FinancialRecord {
        FinancialRecord::new(date.to_string(), kind.to_string(), amount)
            .with_description("test")
            .with_category(category)
    }

    #[test]
    fn test_setup_database_twice() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();

        assert_eq!(verify_count(&conn, DEFAULT_TABLE).unwrap(), 0);
        assert!(column_names(&conn, "campaigns").unwrap().contains(&"title".to_string()));
    }

    #[test]
    fn test_insert_and_read_back_in_order() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let records = vec![
            create_test_record("2024-01-01", "income", 1000.5, "product"),
            create_test_record("2024-01-02", "expense", 200.0, ""),
        ];
        let inserted = insert_records(&conn, DEFAULT_TABLE, &records).unwrap();

        assert_eq!(inserted, 2);
        assert_eq!(get_all_records(&conn, DEFAULT_TABLE).unwrap(), records);
    }

    #[test]
    fn test_insert_into_missing_table_fails_as_local_error() {
        let mut mirror = LocalMirror::open_in_memory().unwrap();
        let records = vec![create_test_record("2024-01-01", "income", 1.0, "")];

        let err = mirror.insert_batch("no_such_table", &records).unwrap_err();
        assert_eq!(err.kind(), "local database");
    }

    #[test]
    fn test_migration_rerun_is_a_no_op() {
        let mut mirror = LocalMirror::open_in_memory().unwrap();
        let migration = Migration::campaign_guide();
        let before = column_names(mirror.connection(), "campaigns").unwrap().len();

        let first = mirror.apply(&migration).unwrap();
        let second = mirror.apply(&migration).unwrap();

        match first {
            MigrationOutcome::Applied { added, already_present } => {
                assert_eq!(added.len(), migration.columns.len());
                assert!(already_present.is_empty());
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        match second {
            MigrationOutcome::Applied { added, already_present } => {
                assert!(added.is_empty(), "second run must not add columns");
                assert_eq!(already_present.len(), migration.columns.len());
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let after = column_names(mirror.connection(), "campaigns").unwrap().len();
        assert_eq!(after, before + migration.columns.len());
    }

    #[test]
    fn test_migrated_columns_get_defaults() {
        let mut mirror = LocalMirror::open_in_memory().unwrap();
        mirror.apply(&Migration::campaign_guide()).unwrap();
        let conn = mirror.connection();

        conn.execute("INSERT INTO campaigns (title) VALUES ('spring launch')", [])
            .unwrap();
        let (child, scenes, tone): (bool, String, Option<String>) = conn
            .query_row(
                "SELECT shooting_scenes_child, required_scenes, video_tone FROM campaigns",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();

        assert!(!child);
        assert_eq!(scenes, "[]");
        assert_eq!(tone, None);
    }

    #[test]
    fn test_import_into_mirror_end_to_end() {
        let text = "record_date,type,amount,description,category\n\
                    2024-01-01,income,1000.50,sale,product\n\
                    2024-01-02,expense,200,rent,\n";
        let report = parse_text(Path::new("ledger.csv"), text, RowErrorPolicy::AbortRun).unwrap();
        let mut mirror = LocalMirror::open_in_memory().unwrap();

        let import = import_records(&mut mirror, DEFAULT_TABLE, &report.records, 1);

        assert!(import.is_complete());
        assert_eq!(import.batches_sent, 2);
        let stored = get_all_records(mirror.connection(), DEFAULT_TABLE).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].category, "");
        assert!(stored.iter().all(|r| !r.is_receivable));
    }

    #[test]
    fn test_run_import_into_file_backed_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("2.csv");
        std::fs::write(&csv_path, "2024-01-01,income,500,note\n2024-01-01,income,500,note,bonus\n").unwrap();
        let db_path = dir.path().join("mirror.db");

        {
            let mut mirror = LocalMirror::open(&db_path).unwrap();
            let report = run_import(&mut mirror, &[&csv_path], &ImportSettings::default()).unwrap();
            assert!(report.is_complete());
        }

        let conn = Connection::open(&db_path).unwrap();
        let stored = get_all_records(&conn, DEFAULT_TABLE).unwrap();
        let categories: Vec<&str> = stored.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(categories, vec!["", "bonus"]);
    }
}
