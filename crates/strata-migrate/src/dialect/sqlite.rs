//! SQLite dialect for migrations.
//!
//! SQLite has limited ALTER TABLE support: columns cannot be modified in
//! place. Generation refuses to plan an `AlterColumn`; rendered directly,
//! one becomes a comment naming the table rebuild to do by hand.

use tracing::warn;

use crate::schema::{NormalizedField, TypeCategory};

use super::MigrationDialect;

/// SQLite migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn type_name(&self, category: TypeCategory) -> &'static str {
        match category {
            TypeCategory::Bool => "BOOLEAN",
            TypeCategory::Int => "INTEGER",
            TypeCategory::Uint => "INTEGER UNSIGNED",
            TypeCategory::Float => "FLOAT",
            TypeCategory::String => "VARCHAR(255)",
            TypeCategory::Time => "DATETIME",
            TypeCategory::Bytes => "BLOB",
        }
    }

    fn auto_increment_keyword(&self) -> Option<&'static str> {
        Some("AUTOINCREMENT")
    }

    // AUTOINCREMENT is only accepted on a column declared exactly
    // `INTEGER PRIMARY KEY`.
    fn auto_increment_type(&self, _category: TypeCategory) -> &'static str {
        "INTEGER"
    }

    fn supports_alter_column(&self) -> bool {
        false
    }

    // An auto-increment key is stored as plain INTEGER whatever its
    // declared signedness.
    fn normalize_field(&self, field: &NormalizedField) -> NormalizedField {
        let mut normalized = field.clone();
        if field.primary_key && field.auto_increment && field.category == TypeCategory::Uint {
            normalized.category = TypeCategory::Int;
        }
        normalized
    }

    fn alter_column(&self, table: &str, field: &NormalizedField) -> String {
        warn!(
            table = %table,
            column = %field.name,
            "SQLite cannot modify columns; the table must be rebuilt by hand"
        );
        format!(
            "-- SQLite cannot MODIFY COLUMN: rebuild table {table} to change {} to {}",
            field.name,
            self.type_name(field.category)
        )
    }
}
