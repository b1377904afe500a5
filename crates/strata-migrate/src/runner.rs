//! Migration runner.
//!
//! This module discovers migration files on disk and applies or rolls them
//! back against a database, keeping the ledger in step.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::ledger::MigrationLedger;

const UP_MARKER: &str = "-- +migrate Up";
const DOWN_MARKER: &str = "-- +migrate Down";

/// The parsed sections of a migration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationScript {
    /// Statements of the Up section.
    pub up: Vec<String>,
    /// Statements of the Down section.
    pub down: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Up,
    Down,
}

/// Parses a migration file body.
///
/// Comment lines (`--`) and blank lines are dropped. A statement may span
/// several lines and ends at a line ending in `;`. Lines before the Up
/// marker are ignored; a body without an Up marker is an error.
pub fn parse_migration(path: &Path, content: &str) -> Result<MigrationScript> {
    let parse_error = |message: &str| MigrateError::Parse {
        path: path.to_path_buf(),
        message: message.to_string(),
    };

    let mut script = MigrationScript::default();
    let mut section = Section::Preamble;
    let mut seen_up = false;
    let mut pending: Vec<&str> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed == UP_MARKER {
            if seen_up {
                return Err(parse_error("duplicate Up marker"));
            }
            flush(section, &mut pending, &mut script);
            section = Section::Up;
            seen_up = true;
            continue;
        }
        if trimmed == DOWN_MARKER {
            if !seen_up {
                return Err(parse_error("Down marker before Up marker"));
            }
            flush(section, &mut pending, &mut script);
            section = Section::Down;
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }
        if section == Section::Preamble {
            warn!(file = %path.display(), line = %trimmed, "Ignoring line outside of a section");
            continue;
        }

        pending.push(line.trim_end());
        if trimmed.ends_with(';') {
            flush(section, &mut pending, &mut script);
        }
    }
    flush(section, &mut pending, &mut script);

    if !seen_up {
        return Err(parse_error("missing '-- +migrate Up' marker"));
    }
    Ok(script)
}

fn flush(section: Section, pending: &mut Vec<&str>, script: &mut MigrationScript) {
    if pending.is_empty() {
        return;
    }
    let statement = pending.join("\n");
    pending.clear();
    match section {
        Section::Up => script.up.push(statement),
        Section::Down => script.down.push(statement),
        Section::Preamble => {}
    }
}

/// A migration file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// File name, the ledger key.
    pub filename: String,
    /// Full path.
    pub path: PathBuf,
}

impl MigrationFile {
    /// Reads and parses the file.
    pub fn load(&self) -> Result<MigrationScript> {
        let content = fs::read_to_string(&self.path)?;
        parse_migration(&self.path, &content)
    }
}

/// Status of one migration file.
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// File name.
    pub filename: String,
    /// When the file was applied, if it was.
    pub applied_at: Option<DateTime<Utc>>,
}

impl MigrationStatus {
    /// Returns true if the file has been applied.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// Outcome of [`MigrationRunner::apply`] or [`MigrationRunner::rollback`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Files whose statements ran, in execution order.
    pub executed: Vec<String>,
    /// Files skipped because they were already applied.
    pub skipped: Vec<String>,
    /// Number of statements executed (or printed in dry-run mode).
    pub statements: usize,
}

/// Applies and rolls back migration files.
pub struct MigrationRunner {
    pool: SqlitePool,
    dirs: Vec<PathBuf>,
    ledger: MigrationLedger,
    dry_run: bool,
}

impl MigrationRunner {
    /// Creates a runner over the given migration directories.
    pub fn new(pool: &SqlitePool, dirs: Vec<PathBuf>) -> Self {
        Self {
            pool: pool.clone(),
            dirs,
            ledger: MigrationLedger::new(pool.clone()),
            dry_run: false,
        }
    }

    /// Enables dry-run mode (SQL is printed but not executed).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Returns the ledger.
    #[must_use]
    pub fn ledger(&self) -> &MigrationLedger {
        &self.ledger
    }

    /// Ensures the ledger table exists.
    pub async fn init(&self) -> Result<()> {
        if !self.dry_run {
            self.ledger.ensure_table().await?;
        }
        Ok(())
    }

    /// Lists `*.sql` files in all directories, sorted by file name.
    pub fn discover(&self) -> Result<Vec<MigrationFile>> {
        let mut files: Vec<MigrationFile> = Vec::new();
        let mut seen: HashMap<String, PathBuf> = HashMap::new();

        for dir in &self.dirs {
            if !dir.is_dir() {
                return Err(MigrateError::MigrationsDirNotFound(dir.clone()));
            }
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if !path.is_file() || path.extension() != Some(OsStr::new("sql")) {
                    continue;
                }
                let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(String::from)
                else {
                    continue;
                };
                if let Some(previous) = seen.insert(filename.clone(), path.clone()) {
                    return Err(MigrateError::InvalidState(format!(
                        "Migration '{filename}' exists in both '{}' and '{}'",
                        previous.display(),
                        path.display()
                    )));
                }
                files.push(MigrationFile { filename, path });
            }
        }

        files.sort_by(|a, b| a.filename.cmp(&b.filename));
        debug!(count = files.len(), "Discovered migration files");
        Ok(files)
    }

    /// Applies every file not yet recorded in the ledger, in order.
    ///
    /// A file is recorded only after all of its statements succeeded.
    pub async fn apply(&self) -> Result<RunReport> {
        self.init().await?;
        let applied = self.applied_set().await?;
        let mut report = RunReport::default();

        for file in self.discover()? {
            if applied.contains(&file.filename) {
                debug!(file = %file.filename, "Already applied, skipping");
                report.skipped.push(file.filename);
                continue;
            }

            info!(file = %file.filename, "Applying migration");
            let script = file.load()?;
            report.statements += self.execute(&file.filename, &script.up).await?;

            if !self.dry_run {
                self.ledger.record_applied(&file.filename).await?;
            }
            info!(file = %file.filename, "Migration applied successfully");
            report.executed.push(file.filename);
        }

        if report.executed.is_empty() {
            info!("No migrations to apply");
        }
        Ok(report)
    }

    /// Rolls back the last `steps` applied files, newest first.
    ///
    /// Each file's Down section runs and its ledger entry is removed.
    pub async fn rollback(&self, steps: usize) -> Result<RunReport> {
        self.init().await?;
        let applied = self.applied_set().await?;
        let mut report = RunReport::default();

        let targets: Vec<MigrationFile> = self
            .discover()?
            .into_iter()
            .rev()
            .filter(|f| applied.contains(&f.filename))
            .take(steps)
            .collect();

        for file in targets {
            info!(file = %file.filename, "Rolling back migration");
            let script = file.load()?;
            if script.down.is_empty() {
                warn!(file = %file.filename, "Migration has no Down statements");
            }
            report.statements += self.execute(&file.filename, &script.down).await?;

            if !self.dry_run {
                self.ledger.record_unapplied(&file.filename).await?;
            }
            info!(file = %file.filename, "Migration rolled back successfully");
            report.executed.push(file.filename);
        }

        if report.executed.is_empty() {
            info!("No migrations to roll back");
        }
        Ok(report)
    }

    /// Lists every discovered file with its applied state.
    pub async fn status(&self) -> Result<Vec<MigrationStatus>> {
        let applied: HashMap<String, DateTime<Utc>> = if self.ledger.exists().await? {
            self.ledger
                .applied()
                .await?
                .into_iter()
                .map(|m| (m.filename, m.applied_at))
                .collect()
        } else {
            HashMap::new()
        };

        Ok(self
            .discover()?
            .into_iter()
            .map(|file| MigrationStatus {
                applied_at: applied.get(&file.filename).copied(),
                filename: file.filename,
            })
            .collect())
    }

    async fn applied_set(&self) -> Result<HashSet<String>> {
        // Dry runs never create the ledger, so it may be missing.
        if self.dry_run && !self.ledger.exists().await? {
            return Ok(HashSet::new());
        }
        self.ledger.applied_set().await
    }

    async fn execute(&self, filename: &str, statements: &[String]) -> Result<usize> {
        for sql in statements {
            debug!(file = %filename, sql = %sql, "Executing SQL");

            if self.dry_run {
                println!("{sql}");
                continue;
            }
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|source| MigrateError::SqlExecution {
                    file: filename.to_string(),
                    statement: sql.clone(),
                    source,
                })?;
        }
        Ok(statements.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    async fn table_exists(pool: &SqlitePool, name: &str) -> bool {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
                .bind(name)
                .fetch_optional(pool)
                .await
                .unwrap();
        row.is_some()
    }

    fn write(dir: &TempDir, name: &str, body: &str) {
        fs::write(dir.path().join(name), body).unwrap();
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        write(
            &dir,
            "0001_create_users.sql",
            "-- +migrate Up\n\
             CREATE TABLE IF NOT EXISTS users (\n  id INTEGER PRIMARY KEY AUTOINCREMENT,\n  username VARCHAR(255) NOT NULL\n);\n\
             \n\
             -- +migrate Down\n\
             DROP TABLE IF EXISTS users;\n",
        );
        write(
            &dir,
            "0002_add_1_fields_to_users.sql",
            "-- +migrate Up\n\
             ALTER TABLE users ADD COLUMN email VARCHAR(255);\n\
             \n\
             -- +migrate Down\n\
             ALTER TABLE users DROP COLUMN email;\n",
        );
        write(&dir, "README.md", "not a migration");
        dir
    }

    #[test]
    fn test_parse_multiline_statements() {
        let script = parse_migration(
            Path::new("0001.sql"),
            "-- +migrate Up\n\
             CREATE TABLE t (\n  id INTEGER\n);\n\
             -- SQLite cannot MODIFY COLUMN\n\
             INSERT INTO t VALUES (1);\n\
             \n\
             -- +migrate Down\n\
             DROP TABLE t;\n",
        )
        .unwrap();
        assert_eq!(
            script.up,
            vec!["CREATE TABLE t (\n  id INTEGER\n);", "INSERT INTO t VALUES (1);"]
        );
        assert_eq!(script.down, vec!["DROP TABLE t;"]);
    }

    #[test]
    fn test_parse_requires_up_marker() {
        let err = parse_migration(Path::new("bad.sql"), "DROP TABLE t;\n").unwrap_err();
        assert!(matches!(err, MigrateError::Parse { .. }));

        let err = parse_migration(Path::new("bad.sql"), "-- +migrate Down\nDROP TABLE t;\n")
            .unwrap_err();
        assert!(matches!(err, MigrateError::Parse { .. }));
    }

    #[test]
    fn test_parse_without_down_section() {
        let script = parse_migration(Path::new("x.sql"), "-- +migrate Up\nSELECT 1;\n").unwrap();
        assert_eq!(script.up, vec!["SELECT 1;"]);
        assert!(script.down.is_empty());
    }

    #[tokio::test]
    async fn test_discover_sorted_sql_only() {
        let dir = fixture();
        let pool = create_test_pool().await;
        let runner = MigrationRunner::new(&pool, vec![dir.path().to_path_buf()]);
        let files = runner.discover().unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(
            names,
            vec!["0001_create_users.sql", "0002_add_1_fields_to_users.sql"]
        );
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let pool = create_test_pool().await;
        let runner = MigrationRunner::new(&pool, vec![PathBuf::from("/nonexistent/migrations")]);
        assert!(matches!(
            runner.discover(),
            Err(MigrateError::MigrationsDirNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_apply_then_reapply() {
        let dir = fixture();
        let pool = create_test_pool().await;
        let runner = MigrationRunner::new(&pool, vec![dir.path().to_path_buf()]);

        let report = runner.apply().await.unwrap();
        assert_eq!(report.executed.len(), 2);
        assert_eq!(report.statements, 2);
        assert!(table_exists(&pool, "users").await);
        assert_eq!(runner.ledger().count().await.unwrap(), 2);

        let again = runner.apply().await.unwrap();
        assert!(again.executed.is_empty());
        assert_eq!(again.skipped.len(), 2);
        assert_eq!(again.statements, 0);
    }

    #[tokio::test]
    async fn test_rollback_last_step() {
        let dir = fixture();
        let pool = create_test_pool().await;
        let runner = MigrationRunner::new(&pool, vec![dir.path().to_path_buf()]);
        runner.apply().await.unwrap();

        let report = runner.rollback(1).await.unwrap();
        assert_eq!(report.executed, vec!["0002_add_1_fields_to_users.sql"]);
        assert!(table_exists(&pool, "users").await);
        assert!(
            !runner
                .ledger()
                .is_applied("0002_add_1_fields_to_users.sql")
                .await
                .unwrap()
        );

        // The rolled back file applies again.
        let report = runner.apply().await.unwrap();
        assert_eq!(report.executed, vec!["0002_add_1_fields_to_users.sql"]);
    }

    #[tokio::test]
    async fn test_failing_statement_stops_file() {
        let dir = fixture();
        write(
            &dir,
            "0003_broken.sql",
            "-- +migrate Up\n\
             CREATE TABLE audit (id INTEGER);\n\
             ALTER TABLE missing ADD COLUMN x INTEGER;\n\
             CREATE TABLE never (id INTEGER);\n",
        );
        let pool = create_test_pool().await;
        let runner = MigrationRunner::new(&pool, vec![dir.path().to_path_buf()]);

        match runner.apply().await.unwrap_err() {
            MigrateError::SqlExecution {
                file, statement, ..
            } => {
                assert_eq!(file, "0003_broken.sql");
                assert_eq!(statement, "ALTER TABLE missing ADD COLUMN x INTEGER;");
            }
            other => panic!("Expected SqlExecution, got {other:?}"),
        }

        assert!(!table_exists(&pool, "never").await);
        let ledger = runner.ledger();
        assert!(ledger.is_applied("0002_add_1_fields_to_users.sql").await.unwrap());
        assert!(!ledger.is_applied("0003_broken.sql").await.unwrap());
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let dir = fixture();
        let pool = create_test_pool().await;
        let runner = MigrationRunner::new(&pool, vec![dir.path().to_path_buf()]).dry_run(true);

        let report = runner.apply().await.unwrap();
        assert_eq!(report.executed.len(), 2);
        assert!(!table_exists(&pool, "users").await);
        assert!(!runner.ledger().exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_status() {
        let dir = fixture();
        let pool = create_test_pool().await;
        let runner = MigrationRunner::new(&pool, vec![dir.path().to_path_buf()]);

        let before = runner.status().await.unwrap();
        assert_eq!(before.len(), 2);
        assert!(before.iter().all(|s| !s.is_applied()));

        runner.apply().await.unwrap();
        runner.rollback(1).await.unwrap();
        let after = runner.status().await.unwrap();
        assert!(after[0].is_applied());
        assert!(!after[1].is_applied());
    }

    #[tokio::test]
    async fn test_multiple_directories() {
        let first = fixture();
        let second = TempDir::new().unwrap();
        write(
            &second,
            "0001_5_posts.sql",
            "-- +migrate Up\nCREATE TABLE posts (id INTEGER);\n-- +migrate Down\nDROP TABLE posts;\n",
        );
        let pool = create_test_pool().await;
        let runner = MigrationRunner::new(
            &pool,
            vec![first.path().to_path_buf(), second.path().to_path_buf()],
        );
        let names: Vec<String> = runner
            .discover()
            .unwrap()
            .into_iter()
            .map(|f| f.filename)
            .collect();
        assert_eq!(
            names,
            vec![
                "0001_5_posts.sql",
                "0001_create_users.sql",
                "0002_add_1_fields_to_users.sql"
            ]
        );
    }
}
