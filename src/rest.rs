// REST client for the hosted database (PostgREST API)
//
// Two endpoints are used: `rpc/exec_sql` for the migrator and the table
// endpoint for batch inserts. Blocking I/O, one request at a time, no retries.

use crate::config::DatabaseConfig;
use crate::error::ClientError;
use crate::importer::RecordSink;
use crate::migration::{Dialect, Migration, MigrationOutcome, MigrationTarget};
use crate::record::FinancialRecord;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Database-side procedure that runs an arbitrary SQL script
pub const EXEC_SQL_PROCEDURE: &str = "exec_sql";

/// SQLSTATE insufficient_privilege
const INSUFFICIENT_PRIVILEGE: &str = "42501";

/// How batches are written to the table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WriteMode {
    #[default]
    Insert,
    /// Merge rows that collide on `on_conflict` (needs a matching unique constraint)
    Upsert { on_conflict: Vec<String> },
}

impl WriteMode {
    fn prefer_header(&self) -> &'static str {
        match self {
            WriteMode::Insert => "return=minimal",
            WriteMode::Upsert { .. } => "resolution=merge-duplicates,return=minimal",
        }
    }
}

#[derive(Serialize)]
struct ExecSqlParams<'a> {
    sql: &'a str,
}

/// Error body returned by PostgREST
#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

impl PostgrestError {
    fn describe(&self) -> String {
        let mut text = self.message.clone().unwrap_or_else(|| "no message".to_string());
        if let Some(details) = self.details.as_deref().filter(|d| !d.is_empty()) {
            text.push_str(&format!(" ({})", details));
        }
        if let Some(hint) = self.hint.as_deref().filter(|h| !h.is_empty()) {
            text.push_str(&format!(" hint: {}", hint));
        }
        text
    }
}

/// Map a non-success response to an error kind
pub fn classify_failure(status: u16, body: &str) -> ClientError {
    let parsed: Option<PostgrestError> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|e| e.code.clone());
    let message = match &parsed {
        Some(err) => err.describe(),
        None if body.trim().is_empty() => "empty response body".to_string(),
        None => body.trim().to_string(),
    };

    if status == 401 || status == 403 || code.as_deref() == Some(INSUFFICIENT_PRIVILEGE) {
        return ClientError::PermissionDenied { status, message };
    }

    match status {
        404 => ClientError::NotFound { status, message },
        400..=499 => ClientError::Rejected {
            status,
            code,
            message,
        },
        500..=599 => ClientError::Server { status, message },
        _ => ClientError::UnexpectedStatus { status, message },
    }
}

pub struct RestClient {
    http: Client,
    config: DatabaseConfig,
    write_mode: WriteMode,
}

impl RestClient {
    pub fn new(config: DatabaseConfig) -> Result<Self, ClientError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(RestClient {
            http: builder.build()?,
            config,
            write_mode: WriteMode::Insert,
        })
    }

    /// Builder pattern: choose insert or upsert for batches
    pub fn with_write_mode(mut self, write_mode: WriteMode) -> Self {
        self.write_mode = write_mode;
        self
    }

    fn post(&self, url: Url) -> RequestBuilder {
        self.http
            .post(url)
            .header("apikey", &self.config.key)
            .bearer_auth(&self.config.key)
    }

    /// Table endpoint, with `on_conflict` when upserting
    pub fn table_url(&self, table: &str) -> Result<Url, ClientError> {
        let mut url = self.config.rest_url(table)?;
        if let WriteMode::Upsert { on_conflict } = &self.write_mode {
            if !on_conflict.is_empty() {
                url.query_pairs_mut()
                    .append_pair("on_conflict", &on_conflict.join(","));
            }
        }
        Ok(url)
    }

    /// Run `sql` through the executor procedure and return its JSON response
    pub fn exec_sql(&self, sql: &str) -> Result<serde_json::Value, ClientError> {
        let url = self.config.rest_url(&format!("rpc/{}", EXEC_SQL_PROCEDURE))?;
        debug!(%url, bytes = sql.len(), "calling SQL executor");

        let response = self.post(url).json(&ExecSqlParams { sql }).send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &body));
        }

        if body.trim().is_empty() {
            Ok(serde_json::Value::Null)
        } else {
            Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
        }
    }

    pub fn insert_records(&self, table: &str, records: &[FinancialRecord]) -> Result<(), ClientError> {
        let url = self.table_url(table)?;
        let payload = serde_json::to_vec(records)?;
        debug!(%url, rows = records.len(), "sending batch");

        let response = self
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("Prefer", self.write_mode.prefer_header())
            .body(payload)
            .send()?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text()?;
        Err(classify_failure(status.as_u16(), &body))
    }
}

impl RecordSink for RestClient {
    fn insert_batch(&mut self, table: &str, records: &[FinancialRecord]) -> Result<(), ClientError> {
        self.insert_records(table, records)
    }

    fn describe(&self) -> String {
        self.config.url.host_str().unwrap_or("remote database").to_string()
    }
}

impl MigrationTarget for RestClient {
    fn apply(&mut self, migration: &Migration) -> Result<MigrationOutcome, ClientError> {
        let script = migration.render(Dialect::Postgres);
        info!(
            migration = migration.name,
            statements = migration.columns.len(),
            "submitting migration"
        );
        let response = self.exec_sql(&script)?;
        Ok(MigrationOutcome::Submitted { response })
    }
}
