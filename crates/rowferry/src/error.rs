//! Error types for the transfer library.

use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of an error.
///
/// Callers use the kind to decide whether a failure is confined to one row
/// (conversion, constraint violation), one table (database, table) or the
/// whole run (internal, cancelled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    UnsupportedType,
    Conversion,
    ConstraintViolation,
    Database,
    Table,
    Internal,
    Io,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::UnsupportedType => "unsupported type",
            ErrorKind::Conversion => "conversion",
            ErrorKind::ConstraintViolation => "constraint violation",
            ErrorKind::Database => "database",
            ErrorKind::Table => "table",
            ErrorKind::Internal => "internal",
            ErrorKind::Io => "io",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A value could not be produced in the requested type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValueError {
    /// Either [`ErrorKind::UnsupportedType`] or [`ErrorKind::Conversion`].
    pub kind: ErrorKind,
    pub message: String,
}

impl ValueError {
    /// No conversion exists between the two types.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::UnsupportedType,
            message: message.into(),
        }
    }

    /// A conversion exists but this particular value does not fit.
    pub fn conversion(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Conversion,
            message: message.into(),
        }
    }
}

/// Main error type for transfer operations.
#[derive(Error, Debug)]
pub enum TransferError {
    /// Configuration error (invalid YAML, missing fields, bad mapping, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single value could not be converted.
    #[error("Value error: {0}")]
    Value(#[from] ValueError),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// PostgreSQL error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Connection could not be established
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// Transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Table { table: String, message: String },

    /// Source and sink disagree on the number of rows handled
    #[error(
        "Row count mismatch for {dataset}: source saw {seen} rows, sink accounted for {accounted}"
    )]
    RowCountMismatch {
        dataset: String,
        seen: u64,
        accounted: u64,
    },

    /// A finished output file could not be moved into place
    #[error("Failed to finalize {path:?}: {source}")]
    Finalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invariant broken inside the engine
    #[error("Internal error: {0}")]
    Internal(String),

    /// The run completed but some tables failed
    #[error("{0}")]
    RunFailed(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Delimited text error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid table name pattern
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] globset::Error),

    /// Transfer was cancelled (SIGINT, etc.)
    #[error("Transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Create a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        TransferError::Config(message.into())
    }

    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl Into<String>, context: impl Into<String>) -> Self {
        TransferError::Connection {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a Table error
    pub fn table(table: impl Into<String>, message: impl Into<String>) -> Self {
        TransferError::Table {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Config(_) | TransferError::Yaml(_) | TransferError::Pattern(_) => {
                ErrorKind::Configuration
            }
            TransferError::Value(e) => e.kind,
            TransferError::Sqlite(e) => sqlite_kind(e),
            TransferError::Postgres(e) => postgres_kind(e),
            TransferError::Connection { .. } => ErrorKind::Database,
            TransferError::Table { .. } | TransferError::RunFailed(_) => ErrorKind::Table,
            TransferError::RowCountMismatch { .. }
            | TransferError::Finalize { .. }
            | TransferError::Internal(_) => ErrorKind::Internal,
            TransferError::Io(_) | TransferError::Json(_) | TransferError::Csv(_) => ErrorKind::Io,
            TransferError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the error must abort the whole run rather than one table.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Internal | ErrorKind::Cancelled)
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::Configuration => 1,
            ErrorKind::Table | ErrorKind::UnsupportedType | ErrorKind::Conversion => 2,
            ErrorKind::Database | ErrorKind::ConstraintViolation => 3,
            ErrorKind::Cancelled => 4,
            ErrorKind::Internal => 5,
            ErrorKind::Io => 7,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

fn sqlite_kind(err: &rusqlite::Error) -> ErrorKind {
    match err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            ErrorKind::ConstraintViolation
        }
        rusqlite::Error::FromSqlConversionFailure(..)
        | rusqlite::Error::IntegralValueOutOfRange(..)
        | rusqlite::Error::InvalidColumnType(..) => ErrorKind::Conversion,
        _ => ErrorKind::Database,
    }
}

fn postgres_kind(err: &tokio_postgres::Error) -> ErrorKind {
    // SQLSTATE class 23 is "integrity constraint violation"
    match err.code() {
        Some(state) if state.code().starts_with("23") => ErrorKind::ConstraintViolation,
        _ => ErrorKind::Database,
    }
}

/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_exit_codes() {
        assert_eq!(TransferError::config("x").kind(), ErrorKind::Configuration);
        assert_eq!(TransferError::config("x").exit_code(), 1);
        assert_eq!(TransferError::table("t", "gone").exit_code(), 2);
        assert_eq!(TransferError::Cancelled.exit_code(), 4);

        let io = TransferError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "nope"));
        assert_eq!(io.exit_code(), 7);
        assert!(!io.is_fatal());
    }

    #[test]
    fn test_row_count_mismatch_is_fatal() {
        let err = TransferError::RowCountMismatch {
            dataset: "items".into(),
            seen: 3,
            accounted: 2,
        };
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.is_fatal());
        assert!(err.to_string().contains("source saw 3 rows"));
    }

    #[test]
    fn test_value_error_keeps_kind() {
        let err: TransferError = ValueError::conversion("not a number").into();
        assert_eq!(err.kind(), ErrorKind::Conversion);
        let err: TransferError = ValueError::unsupported("no path").into();
        assert_eq!(err.kind(), ErrorKind::UnsupportedType);
    }

    #[test]
    fn test_sqlite_constraint_kind() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY); INSERT INTO t VALUES (1);")
            .unwrap();
        let err = conn.execute("INSERT INTO t VALUES (1)", []).unwrap_err();
        assert_eq!(
            TransferError::from(err).kind(),
            ErrorKind::ConstraintViolation
        );
    }

    #[test]
    fn test_format_detailed_walks_chain() {
        let err = TransferError::Finalize {
            path: PathBuf::from("out.csv"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: Failed to finalize"));
        assert!(detailed.contains("Caused by:\n  1: denied"));
    }
}
