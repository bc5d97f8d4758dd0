// Error taxonomy for the importer and migrator
//
// Row and file errors are matched on by the loader's bad-row policy, client
// errors are printed with their kind at the top level. Everything is terminal
// for the current run; nothing here is retried.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required variable not set (or empty)
    #[error("Missing configuration: {0} is not set")]
    Missing(&'static str),

    /// Variable set but unusable
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

/// A single CSV row that could not be turned into a record
#[derive(Debug, Error)]
pub enum RowError {
    #[error("line {line}: missing required field '{field}'")]
    MissingField { line: u64, field: &'static str },

    #[error("line {line}: amount '{value}' is not a number")]
    InvalidAmount { line: u64, value: String },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
}

impl RowError {
    /// Line number in the source file, when known
    pub fn line(&self) -> Option<u64> {
        match self {
            RowError::MissingField { line, .. } | RowError::InvalidAmount { line, .. } => {
                Some(*line)
            }
            RowError::Csv(err) => err.position().map(|p| p.line()),
        }
    }
}

/// Errors raised while loading source files
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: header has no '{column}' column", .path.display())]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("{}: {source}", .path.display())]
    Row {
        path: PathBuf,
        #[source]
        source: RowError,
    },
}

/// Failures talking to the database (remote service or local mirror)
#[derive(Debug, Error)]
pub enum ClientError {
    /// Request could not be built or never got an HTTP response (DNS, TLS, refused, timeout)
    #[error("connection failed: {0}")]
    Connectivity(#[from] reqwest::Error),

    #[error("permission denied (HTTP {status}): {message}")]
    PermissionDenied { status: u16, message: String },

    #[error("not found (HTTP {status}): {message}")]
    NotFound { status: u16, message: String },

    /// Malformed SQL, bad payload, constraint violation
    #[error("request rejected (HTTP {status}{}): {message}", code_suffix(.code))]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("unexpected response (HTTP {status}): {message}")]
    UnexpectedStatus { status: u16, message: String },

    #[error("local database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn code_suffix(code: &Option<String>) -> String {
    match code {
        Some(c) => format!(", code {}", c),
        None => String::new(),
    }
}

impl ClientError {
    /// Short category name for console output
    pub fn kind(&self) -> &'static str {
        match self {
            ClientError::Connectivity(_) => "connectivity",
            ClientError::PermissionDenied { .. } => "permission denied",
            ClientError::NotFound { .. } => "not found",
            ClientError::Rejected { .. } => "rejected request",
            ClientError::Server { .. } => "server error",
            ClientError::UnexpectedStatus { .. } => "unexpected response",
            ClientError::Sqlite(_) => "local database",
            ClientError::Encode(_) => "encoding",
            ClientError::Config(_) => "configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_message_includes_code() {
        let err = ClientError::Rejected {
            status: 400,
            code: Some("42601".to_string()),
            message: "syntax error at or near \"ALTR\"".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("HTTP 400, code 42601"), "got: {}", text);
        assert_eq!(err.kind(), "rejected request");
    }

    #[test]
    fn test_rejected_message_without_code() {
        let err = ClientError::Rejected {
            status: 400,
            code: None,
            message: "bad".to_string(),
        };
        assert_eq!(err.to_string(), "request rejected (HTTP 400): bad");
    }

    #[test]
    fn test_row_error_line() {
        let err = RowError::InvalidAmount {
            line: 7,
            value: "abc".to_string(),
        };
        assert_eq!(err.line(), Some(7));
        assert_eq!(err.to_string(), "line 7: amount 'abc' is not a number");
    }
}
