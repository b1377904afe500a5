//! Applied-migrations ledger.
//!
//! This module manages the `strata_migrations` table that records which
//! migration files have been applied to the database, keyed by file name.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqlitePool;

use crate::error::{MigrateError, Result};

/// Name of the ledger table.
pub const LEDGER_TABLE: &str = "strata_migrations";

/// SQL to create the ledger table (SQLite).
pub const CREATE_LEDGER_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS strata_migrations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL UNIQUE,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
)
"#;

/// A record of an applied migration file.
#[derive(Debug, Clone)]
pub struct AppliedMigration {
    /// Row id in the ledger.
    pub id: i64,
    /// Migration file name.
    pub filename: String,
    /// When the file was applied.
    pub applied_at: DateTime<Utc>,
}

/// Manages the ledger table.
#[derive(Debug, Clone)]
pub struct MigrationLedger {
    pool: SqlitePool,
}

impl MigrationLedger {
    /// Creates a ledger on the given pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ensures the ledger table exists.
    pub async fn ensure_table(&self) -> Result<()> {
        sqlx::query(CREATE_LEDGER_TABLE_SQL)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns true if the ledger table has been created.
    pub async fn exists(&self) -> Result<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(LEDGER_TABLE)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Records a file as applied.
    pub async fn record_applied(&self, filename: &str) -> Result<()> {
        sqlx::query("INSERT INTO strata_migrations (filename) VALUES (?)")
            .bind(filename)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes a file's record so it can be applied again.
    pub async fn record_unapplied(&self, filename: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM strata_migrations WHERE filename = ?")
            .bind(filename)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MigrateError::InvalidState(format!(
                "Migration '{filename}' is not recorded as applied"
            )));
        }

        Ok(())
    }

    /// Checks if a file has been applied.
    pub async fn is_applied(&self, filename: &str) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM strata_migrations WHERE filename = ?")
                .bind(filename)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.is_some())
    }

    /// Gets all applied migrations in application order.
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT id, filename, applied_at FROM strata_migrations ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, filename, applied_at)| AppliedMigration {
                id,
                filename,
                applied_at: parse_timestamp(&applied_at),
            })
            .collect())
    }

    /// Gets the set of applied file names.
    pub async fn applied_set(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT filename FROM strata_migrations")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Counts applied migrations.
    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM strata_migrations")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite datetime('now') format
            NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").map(|dt| dt.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}
