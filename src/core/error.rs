/// sqlhelper Error Module
///
/// This module defines the error types used across sqlhelper. Driver failures
/// are carried as `DriverError`, connection failures are classified into
/// `ConnectError`, and everything a caller can see is a `SqlHelperError`.
use thiserror::Error;

/// Coarse classification a driver attaches to every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Bad user name or password
    AccessDenied,
    /// The requested database does not exist on the host
    UnknownDatabase,
    /// Anything else: syntax errors, missing tables, lost connections
    Other,
}

/// An error reported by the underlying database driver.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        DriverError {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for an unclassified driver error.
    pub fn other(message: impl Into<String>) -> Self {
        DriverError::new(DriverErrorKind::Other, message)
    }
}

impl From<rusqlite::Error> for DriverError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        let kind = match err.sqlite_error_code() {
            Some(ErrorCode::PermissionDenied) | Some(ErrorCode::AuthorizationForStatementDenied) => {
                DriverErrorKind::AccessDenied
            }
            Some(ErrorCode::CannotOpen) => DriverErrorKind::UnknownDatabase,
            _ => DriverErrorKind::Other,
        };
        DriverError::new(kind, err.to_string())
    }
}

/// Failure to open a session, classified by driver error kind.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("access denied for the configured user name or password on {host}")]
    AccessDenied { host: String },

    #[error("could not find database {database:?} on {host}")]
    UnknownDatabase {
        host: String,
        database: Option<String>,
    },

    #[error("could not connect to {host}: {source}")]
    Other {
        host: String,
        #[source]
        source: DriverError,
    },
}

/// Error type returned by every fallible sqlhelper operation.
#[derive(Error, Debug)]
pub enum SqlHelperError {
    /// The session could not be opened
    #[error("Connection error: {0}")]
    Connect(#[from] ConnectError),

    /// A query or statement failed on every attempt and the caller asked
    /// for failures to escalate
    #[error("Statement failed after {attempts} attempt(s): {source}")]
    StatementFailed {
        attempts: u32,
        sql: String,
        #[source]
        source: DriverError,
    },

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Type alias for Result to use SqlHelperError as the error type.
pub type Result<T> = std::result::Result<T, SqlHelperError>;
