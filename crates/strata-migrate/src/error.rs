//! Error types for the migration engine.

use std::path::PathBuf;

/// Errors that can occur while generating or applying migrations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// A model field declares a type that has no SQL type category.
    #[error("Model '{model}': field '{field}' has unsupported type '{declared}'")]
    Metadata {
        /// Model name.
        model: String,
        /// Field name.
        field: String,
        /// The declared type as written in the descriptor.
        declared: String,
    },

    /// Reading the live database catalog failed.
    #[error("Failed to introspect {}: {source}", introspection_target(.table.as_deref()))]
    Introspection {
        /// Table being read, `None` while listing tables.
        table: Option<String>,
        /// Underlying driver error.
        #[source]
        source: sqlx::Error,
    },

    /// A foreign key or many-to-many edge points at an unregistered table.
    #[error("Table '{referenced_by}' references unknown table '{table}'")]
    UnknownTable {
        /// The table that could not be found.
        table: String,
        /// The table declaring the reference.
        referenced_by: String,
    },

    /// Tables depend on each other in a cycle.
    #[error("Cyclic table dependency: {}", .cycle.join(" -> "))]
    CyclicDependency {
        /// Tables on the cycle, first table repeated at the end.
        cycle: Vec<String>,
    },

    /// A change the target database cannot apply to an existing table.
    #[error("Cannot change column '{table}.{column}': {reason}")]
    UnsupportedChange {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// What prevents the change.
        reason: String,
    },

    /// A statement failed while applying or rolling back a migration file.
    #[error("Failed to execute statement in '{file}':\n  {statement}\n  caused by: {source}")]
    SqlExecution {
        /// Migration file name.
        file: String,
        /// The statement that failed.
        statement: String,
        /// Underlying driver error.
        #[source]
        source: sqlx::Error,
    },

    /// Failed to parse migration file.
    #[error("Failed to parse migration file '{path}': {message}")]
    Parse {
        /// Path to the migration file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),

    /// No migrations directory found.
    #[error("Migrations directory not found: {0}")]
    MigrationsDirNotFound(PathBuf),

    /// Invalid migration state.
    #[error("Invalid migration state: {0}")]
    InvalidState(String),

    /// Database error outside of a migration file (ledger, connection).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading/writing migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn introspection_target(table: Option<&str>) -> String {
    table.map_or_else(|| "table list".to_string(), |t| format!("table '{t}'"))
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
