//! Migration file writer.
//!
//! Files are named `<id>_<slug>.sql` and hold an Up and a Down section.
//! An existing file is never overwritten.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{MigrateError, Result};
use crate::migration::Migration;
use crate::operations::{Operation, OperationKind};

static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)_").expect("valid regex"));

/// How migration ids are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdScheme {
    /// Zero-padded sequence numbers: `0001`, `0002`, ...
    #[default]
    Ordinal,
    /// UTC timestamps: `20240131120000`.
    Timestamp,
}

/// Writes migrations into a directory.
#[derive(Debug, Clone)]
pub struct MigrationWriter {
    dir: PathBuf,
    scheme: IdScheme,
}

impl MigrationWriter {
    /// Creates a writer for `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, scheme: IdScheme) -> Self {
        Self {
            dir: dir.into(),
            scheme,
        }
    }

    /// Returns the target directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Computes the id the next migration file will get.
    pub fn next_id(&self) -> Result<String> {
        let existing = self.existing_files()?;
        match self.scheme {
            IdScheme::Ordinal => {
                let max = existing
                    .iter()
                    .filter_map(|name| ORDINAL_RE.captures(name))
                    .filter_map(|caps| caps[1].parse::<u64>().ok())
                    .max()
                    .unwrap_or(0);
                Ok(format!("{:04}", max + 1))
            }
            IdScheme::Timestamp => {
                let now = Utc::now().format("%Y%m%d%H%M%S").to_string();
                let mut id: u64 = now.parse().map_err(|_| {
                    MigrateError::InvalidState(format!("Bad timestamp id '{now}'"))
                })?;
                while existing.iter().any(|name| name.starts_with(&format!("{id}_"))) {
                    id += 1;
                }
                Ok(id.to_string())
            }
        }
    }

    /// Writes a migration and returns the path of the new file.
    ///
    /// Fails with [`MigrateError::MigrationExists`] rather than touching an
    /// existing file.
    pub fn write(&self, migration: &Migration) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let id = match &migration.id {
            Some(id) => id.clone(),
            None => self.next_id()?,
        };
        let path = self.dir.join(format!("{id}_{}.sql", migration.name));

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => MigrateError::MigrationExists(path.clone()),
                _ => MigrateError::Io(e),
            })?;
        file.write_all(migration.render().as_bytes())?;

        info!(file = %path.display(), statements = migration.up.len(), "Created migration");
        Ok(path)
    }

    fn existing_files(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

/// Builds the slug naming a set of operations.
///
/// Created tables come first (`create_<a>_<b>` or `create_<n>_tables`
/// above three), then per table in order of appearance the added, altered
/// and removed column counts, then dropped tables. Parts are joined with
/// `_and_`.
#[must_use]
pub fn describe_operations(operations: &[Operation]) -> String {
    let tables_of = |kind: OperationKind| -> Vec<&str> {
        operations
            .iter()
            .filter(|op| op.kind() == kind)
            .map(Operation::table)
            .collect()
    };

    let mut parts = Vec::new();

    let created = tables_of(OperationKind::Create);
    if !created.is_empty() {
        parts.push(summarize_tables("create", &created));
    }

    let mut column_counts: Vec<(&str, [usize; 3])> = Vec::new();
    for op in operations {
        let slot = match op.kind() {
            OperationKind::Add => 0,
            OperationKind::Alter => 1,
            OperationKind::Remove => 2,
            OperationKind::Create | OperationKind::Drop => continue,
        };
        match column_counts.iter_mut().find(|(t, _)| *t == op.table()) {
            Some((_, counts)) => counts[slot] += 1,
            None => {
                let mut counts = [0; 3];
                counts[slot] = 1;
                column_counts.push((op.table(), counts));
            }
        }
    }
    for (table, [added, altered, removed]) in column_counts {
        if added > 0 {
            parts.push(format!("add_{added}_fields_to_{table}"));
        }
        if altered > 0 {
            parts.push(format!("alter_{altered}_fields_in_{table}"));
        }
        if removed > 0 {
            parts.push(format!("remove_{removed}_fields_from_{table}"));
        }
    }

    let dropped = tables_of(OperationKind::Drop);
    if !dropped.is_empty() {
        parts.push(summarize_tables("drop", &dropped));
    }

    if parts.is_empty() {
        "empty".to_string()
    } else {
        parts.join("_and_").to_lowercase()
    }
}

fn summarize_tables(verb: &str, tables: &[&str]) -> String {
    if tables.len() > 3 {
        format!("{verb}_{}_tables", tables.len())
    } else {
        format!("{verb}_{}", tables.join("_"))
    }
}
