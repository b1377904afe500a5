//! Runtime configuration.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::dialect::Dialect;
use crate::error::Result;
use crate::writer::IdScheme;

/// Everything a command needs to know about its environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrateConfig {
    /// Database URL, e.g. `sqlite:db.sqlite3`.
    pub database_url: String,
    /// Migration directories. New files go into the first one.
    pub migrations_dirs: Vec<PathBuf>,
    /// JSON model manifest.
    pub models_file: PathBuf,
    /// DDL dialect of generated files.
    pub dialect: Dialect,
    /// How new migration ids are generated.
    pub id_scheme: IdScheme,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:db.sqlite3".to_string(),
            migrations_dirs: vec![PathBuf::from("migrations")],
            models_file: PathBuf::from("models.json"),
            dialect: Dialect::Sqlite,
            id_scheme: IdScheme::Ordinal,
        }
    }
}

impl MigrateConfig {
    /// Sets the database URL.
    #[must_use]
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    /// Replaces the migration directories.
    #[must_use]
    pub fn migrations_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        if !dirs.is_empty() {
            self.migrations_dirs = dirs;
        }
        self
    }

    /// Sets the model manifest path.
    #[must_use]
    pub fn models_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.models_file = path.into();
        self
    }

    /// Sets the dialect.
    #[must_use]
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Sets the id scheme.
    #[must_use]
    pub fn id_scheme(mut self, scheme: IdScheme) -> Self {
        self.id_scheme = scheme;
        self
    }

    /// Directory new migration files are written to.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.migrations_dirs
            .first()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("migrations"))
    }

    /// Opens the single database connection used by a command.
    ///
    /// The database file is created if it does not exist.
    pub async fn connect(&self) -> Result<SqlitePool> {
        let options = SqliteConnectOptions::from_str(&self.database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(pool)
    }
}
