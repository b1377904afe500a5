//! Database dialect implementations.
//!
//! Each dialect knows how to render operations as DDL for one database
//! system. The [`Dialect`] enum selects one implementation from
//! configuration.

mod generic;
mod mysql;
mod sqlite;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

pub use generic::GenericDialect;
pub use mysql::MySqlDialect;
use regex::Regex;
use serde::{Deserialize, Serialize};
pub use sqlite::SqliteDialect;

use crate::error::{MigrateError, Result as MigrateResult};
use crate::operations::Operation;
use crate::schema::{NormalizedField, TableSchema, TypeCategory};

/// Trait for database-specific SQL generation.
///
/// Every rendered statement ends with `;`. Lines starting with `--` are
/// comments that the runner skips.
pub trait MigrationDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the SQL type name for a type category.
    fn type_name(&self, category: TypeCategory) -> &'static str;

    /// Returns the auto-increment keyword, if the dialect has one.
    fn auto_increment_keyword(&self) -> Option<&'static str>;

    /// Returns the type rendered for an auto-incrementing primary key.
    fn auto_increment_type(&self, category: TypeCategory) -> &'static str {
        self.type_name(category)
    }

    /// Returns false if columns cannot be changed in place.
    fn supports_alter_column(&self) -> bool {
        true
    }

    /// Returns the field as this dialect stores and reports it back.
    ///
    /// Desired fields are normalized before being compared with the live
    /// schema, so that a lossy rendering does not show up as a change.
    fn normalize_field(&self, field: &NormalizedField) -> NormalizedField {
        field.clone()
    }

    /// Checks that an operation can be applied to an existing database.
    ///
    /// Columns added to a table with rows need a value: a NOT NULL column
    /// requires a default and a primary key column cannot be added at all.
    fn check_operation(&self, operation: &Operation) -> MigrateResult<()> {
        let unsupported = |table: &str, column: &str, reason: &str| {
            Err(MigrateError::UnsupportedChange {
                table: table.to_string(),
                column: column.to_string(),
                reason: reason.to_string(),
            })
        };
        match operation {
            Operation::AddColumn { table, field } if field.primary_key => {
                unsupported(table, &field.name, "a primary key column cannot be added")
            }
            Operation::AddColumn { table, field } if !field.nullable && field.default.is_none() => {
                unsupported(
                    table,
                    &field.name,
                    "a NOT NULL column needs a default value to be added",
                )
            }
            Operation::AlterColumn { table, field, .. } if !self.supports_alter_column() => {
                unsupported(
                    table,
                    &field.name,
                    &format!("{} cannot modify columns; rebuild the table", self.name()),
                )
            }
            _ => Ok(()),
        }
    }

    /// Generates a column definition inside `CREATE TABLE`.
    ///
    /// `inline_primary_key` is false when the key is rendered as a table
    /// constraint instead.
    fn column_definition(&self, field: &NormalizedField, inline_primary_key: bool) -> String {
        let auto_key = inline_primary_key && field.primary_key && field.auto_increment;
        let type_name = if auto_key {
            self.auto_increment_type(field.category)
        } else {
            self.type_name(field.category)
        };
        let mut parts = vec![field.name.clone(), type_name.to_string()];

        if inline_primary_key && field.primary_key {
            parts.push("PRIMARY KEY".to_string());
            if field.auto_increment {
                if let Some(keyword) = self.auto_increment_keyword() {
                    parts.push(keyword.to_string());
                }
            }
        }

        if !field.nullable && !(inline_primary_key && field.primary_key) {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = &field.default {
            parts.push(format!("DEFAULT {default}"));
        }

        parts.join(" ")
    }

    /// Generates the table-level constraints: composite primary key,
    /// foreign keys, then unique constraints.
    fn table_constraints(&self, schema: &TableSchema) -> Vec<String> {
        let mut constraints = Vec::new();

        if schema.has_composite_key() {
            constraints.push(format!("PRIMARY KEY ({})", schema.primary_key.join(", ")));
        }

        for field in &schema.fields {
            if let Some(fk) = &field.foreign_key {
                let mut constraint = format!(
                    "CONSTRAINT fk_{}_{} FOREIGN KEY ({}) REFERENCES {}({})",
                    schema.name, field.name, field.name, fk.table, fk.column
                );
                if let Some(action) = fk.on_delete {
                    constraint.push_str(" ON DELETE ");
                    constraint.push_str(action.to_sql());
                }
                constraints.push(constraint);
            }
        }

        for field in &schema.fields {
            if field.unique {
                constraints.push(format!(
                    "CONSTRAINT uk_{}_{} UNIQUE ({})",
                    schema.name, field.name, field.name
                ));
            }
        }

        constraints
    }

    /// Generates `CREATE TABLE IF NOT EXISTS` for a whole table.
    fn create_table(&self, schema: &TableSchema) -> String {
        let inline_key = !schema.has_composite_key();
        let lines: Vec<String> = schema
            .fields
            .iter()
            .map(|f| self.column_definition(f, inline_key))
            .chain(self.table_constraints(schema))
            .collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n);",
            schema.name,
            lines.join(",\n  ")
        )
    }

    /// Generates `DROP TABLE IF EXISTS`.
    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {table};")
    }

    /// Generates `ALTER TABLE ... ADD COLUMN`.
    ///
    /// NOT NULL is only carried when a default is present, since existing
    /// rows need a value.
    fn add_column(&self, table: &str, field: &NormalizedField) -> String {
        let mut sql = format!(
            "ALTER TABLE {table} ADD COLUMN {} {}",
            field.name,
            self.type_name(field.category)
        );
        if let Some(default) = &field.default {
            if !field.nullable {
                sql.push_str(" NOT NULL");
            }
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql.push(';');
        sql
    }

    /// Generates `ALTER TABLE ... DROP COLUMN`.
    fn drop_column(&self, table: &str, column: &str) -> String {
        format!("ALTER TABLE {table} DROP COLUMN {column};")
    }

    /// Generates the unique index backing a column added as UNIQUE.
    ///
    /// Named like the `uk_` table constraints of `CREATE TABLE`.
    fn create_unique_index(&self, table: &str, column: &str) -> String {
        format!("CREATE UNIQUE INDEX uk_{table}_{column} ON {table} ({column});")
    }

    /// Drops the index created by [`Self::create_unique_index`].
    fn drop_unique_index(&self, table: &str, column: &str) -> String {
        format!("DROP INDEX IF EXISTS uk_{table}_{column};")
    }

    /// Generates the statement changing a column to `field`'s type.
    fn alter_column(&self, table: &str, field: &NormalizedField) -> String {
        format!(
            "ALTER TABLE {table} MODIFY COLUMN {} {};",
            field.name,
            self.type_name(field.category)
        )
    }

    /// Renders the forward statements of an operation.
    fn up_sql(&self, operation: &Operation) -> Vec<String> {
        match operation {
            Operation::CreateTable { schema } => vec![self.create_table(schema)],
            Operation::DropTable { schema } => vec![self.drop_table(&schema.name)],
            Operation::AddColumn { table, field } => {
                let mut statements = vec![self.add_column(table, field)];
                if field.unique {
                    statements.push(self.create_unique_index(table, &field.name));
                }
                statements
            }
            Operation::DropColumn { table, field } => {
                let mut statements = Vec::new();
                // An indexed column cannot be dropped.
                if field.unique {
                    statements.push(self.drop_unique_index(table, &field.name));
                }
                statements.push(self.drop_column(table, &field.name));
                statements
            }
            Operation::AlterColumn { table, field, .. } => vec![self.alter_column(table, field)],
        }
    }

    /// Renders the statements that undo an operation.
    fn down_sql(&self, operation: &Operation) -> Vec<String> {
        self.up_sql(&operation.reverse())
    }
}

/// The supported dialects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// SQLite.
    #[default]
    Sqlite,
    /// MySQL / MariaDB.
    #[value(name = "mysql")]
    MySql,
    /// Portable SQL without engine extensions.
    Generic,
}

impl Dialect {
    /// Returns the implementation for this dialect.
    #[must_use]
    pub fn implementation(&self) -> &'static dyn MigrationDialect {
        match self {
            Self::Sqlite => &SqliteDialect,
            Self::MySql => &MySqlDialect,
            Self::Generic => &GenericDialect,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.implementation().name())
    }
}

impl FromStr for Dialect {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "generic" => Ok(Self::Generic),
            other => Err(MigrateError::InvalidState(format!(
                "Unknown dialect '{other}'"
            ))),
        }
    }
}

static CREATE_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*CREATE TABLE IF NOT EXISTS (\w+) \(").expect("valid regex")
});

/// Removes repeated `CREATE TABLE IF NOT EXISTS` statements for the same
/// table, keeping the first. Other statements pass through in order.
#[must_use]
pub fn dedupe_create_tables(statements: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    statements
        .into_iter()
        .filter(|stmt| match CREATE_TABLE_RE.captures(stmt) {
            Some(caps) => seen.insert(caps[1].to_ascii_lowercase()),
            None => true,
        })
        .collect()
}
