//! Error types for the upgrade check library.

use std::path::PathBuf;
use thiserror::Error;

/// Exit code for configuration errors (invalid YAML, bad templates, etc.).
pub const EXIT_CONFIG_ERROR: u8 = 1;
/// Exit code for connection and pool errors.
pub const EXIT_DATABASE_ERROR: u8 = 2;
/// Exit code for snapshot file precondition violations.
pub const EXIT_PRECONDITION_ERROR: u8 = 3;
/// Exit code for unreadable or malformed snapshot files.
pub const EXIT_SNAPSHOT_ERROR: u8 = 4;
/// Exit code for a compare query that failed mid-run.
pub const EXIT_QUERY_ERROR: u8 = 5;
/// Exit code when mismatches were found and the caller asked to fail on them.
pub const EXIT_MISMATCH: u8 = 6;
/// Exit code for IO errors (file not found, permission denied).
pub const EXIT_IO_ERROR: u8 = 7;
/// Exit code after SIGINT/SIGTERM.
pub const EXIT_CANCELLED: u8 = 130;

/// Main error type for checkpoint collection and comparison.
#[derive(Error, Debug)]
pub enum CheckError {
    /// Configuration error (invalid YAML, unsafe table name, bad template)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query error
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A file that must exist is missing, or one that must not exist is present
    #[error("{0}")]
    Precondition(String),

    /// Snapshot file could not be read or parsed
    #[error("Snapshot file {}: {message}", path.display())]
    Snapshot { path: PathBuf, message: String },

    /// A compare query failed; aborts the whole run
    #[error("Query failed for table {table} during {phase}: {message}")]
    Query {
        table: String,
        phase: String,
        message: String,
    },

    /// Comparison finished but reported issues
    #[error("{issues} issue(s) found across {tables} table(s)")]
    MismatchesFound { issues: u64, tables: usize },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Run cancelled")]
    Cancelled,
}

impl CheckError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        CheckError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Snapshot error for the given file
    pub fn snapshot(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        CheckError::Snapshot {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a Query error
    pub fn query(
        table: impl Into<String>,
        phase: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        CheckError::Query {
            table: table.into(),
            phase: phase.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code for this error class.
    pub fn exit_code(&self) -> u8 {
        match self {
            CheckError::Config(_) | CheckError::Yaml(_) => EXIT_CONFIG_ERROR,
            CheckError::Database(_) | CheckError::Pool { .. } => EXIT_DATABASE_ERROR,
            CheckError::Precondition(_) => EXIT_PRECONDITION_ERROR,
            CheckError::Snapshot { .. } | CheckError::Json(_) => EXIT_SNAPSHOT_ERROR,
            CheckError::Query { .. } => EXIT_QUERY_ERROR,
            CheckError::MismatchesFound { .. } => EXIT_MISMATCH,
            CheckError::Io(_) => EXIT_IO_ERROR,
            CheckError::Cancelled => EXIT_CANCELLED,
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

/// Result type alias for upgrade check operations.
pub type Result<T> = std::result::Result<T, CheckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_class() {
        assert_eq!(CheckError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            CheckError::Precondition("file already exists: a.json".into()).exit_code(),
            EXIT_PRECONDITION_ERROR
        );
        assert_eq!(
            CheckError::snapshot("a.json", "bad").exit_code(),
            EXIT_SNAPSHOT_ERROR
        );
        assert_eq!(
            CheckError::query("t", "compare", "boom").exit_code(),
            EXIT_QUERY_ERROR
        );
        assert_eq!(CheckError::Cancelled.exit_code(), EXIT_CANCELLED);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(CheckError::from(io).exit_code(), EXIT_IO_ERROR);
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = CheckError::from(io);
        let text = err.format_detailed();
        assert!(text.starts_with("Error: IO error: denied"));
    }

    #[test]
    fn test_query_error_names_table_and_phase() {
        let err = CheckError::query("orders", "compare window [0, 1000)", "timeout");
        assert_eq!(
            err.to_string(),
            "Query failed for table orders during compare window [0, 1000): timeout"
        );
    }
}
