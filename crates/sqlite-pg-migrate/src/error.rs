//! Error types for the migration library.
//!
//! Only run-level problems are errors. Row-level outcomes (skipped rows,
//! rejected inserts) are recorded in the [`crate::report::MigrationReport`]
//! instead of being propagated.

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, bad table rules, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A store could not be reached at startup. Fatal for the whole run.
    #[error("Cannot connect to {store} store: {message}")]
    Connection { store: String, message: String },

    /// Source database query error
    #[error("Source database error: {0}")]
    Source(#[from] rusqlite::Error),

    /// Target database query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Schema introspection failed
    #[error("Schema extraction failed: {0}")]
    SchemaExtraction(String),

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// Table references form a cycle, so no dependency order exists
    #[error("Foreign-key references form a cycle between tables: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    /// The run was interrupted before it finished
    #[error("Migration cancelled")]
    Cancelled,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Connection error for the named store ("source" or "target")
    pub fn connection(store: impl Into<String>, message: impl std::fmt::Display) -> Self {
        MigrateError::Connection {
            store: store.into(),
            message: message.to_string(),
        }
    }

    /// Process exit code for this error.
    ///
    /// Configuration problems exit with 2, connectivity failures with 3, an
    /// interrupted run with 130 and everything else with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_)
            | MigrateError::DependencyCycle(_)
            | MigrateError::Yaml(_) => 2,
            MigrateError::Connection { .. } | MigrateError::Pool { .. } => 3,
            MigrateError::Cancelled => 130,
            _ => 1,
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

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("bad".into()).exit_code(), 2);
        assert_eq!(
            MigrateError::DependencyCycle(vec!["a".into(), "b".into()]).exit_code(),
            2
        );
        assert_eq!(MigrateError::connection("source", "refused").exit_code(), 3);
        assert_eq!(MigrateError::transfer("users", "boom").exit_code(), 1);
        assert_eq!(MigrateError::Cancelled.exit_code(), 130);
    }

    #[test]
    fn test_cycle_message_lists_tables() {
        let err = MigrateError::DependencyCycle(vec!["orders".into(), "carts".into()]);
        assert_eq!(
            err.to_string(),
            "Foreign-key references form a cycle between tables: orders, carts"
        );
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.yaml");
        let err = MigrateError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: missing.yaml"));
    }
}
