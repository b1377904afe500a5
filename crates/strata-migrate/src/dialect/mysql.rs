//! MySQL dialect for migrations.

use crate::schema::TypeCategory;

use super::MigrationDialect;

/// MySQL / MariaDB migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl MigrationDialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn type_name(&self, category: TypeCategory) -> &'static str {
        match category {
            TypeCategory::Bool => "BOOLEAN",
            TypeCategory::Int => "INT",
            TypeCategory::Uint => "INT UNSIGNED",
            TypeCategory::Float => "DOUBLE",
            TypeCategory::String => "VARCHAR(255)",
            TypeCategory::Time => "DATETIME",
            TypeCategory::Bytes => "BLOB",
        }
    }

    fn auto_increment_keyword(&self) -> Option<&'static str> {
        Some("AUTO_INCREMENT")
    }

    fn drop_unique_index(&self, table: &str, column: &str) -> String {
        format!("DROP INDEX uk_{table}_{column} ON {table};")
    }
}
