//! Portable SQL without engine-specific extensions.

use crate::schema::TypeCategory;

use super::MigrationDialect;

/// Generic migration dialect. Auto-increment columns render as a plain
/// `PRIMARY KEY`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDialect;

impl MigrationDialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
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
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NormalizedField;

    #[test]
    fn test_auto_increment_is_plain_primary_key() {
        let field = NormalizedField::new("id", TypeCategory::Int)
            .primary_key()
            .auto_increment();
        assert_eq!(
            GenericDialect.column_definition(&field, true),
            "id INTEGER PRIMARY KEY"
        );
    }

    #[test]
    fn test_modify_column() {
        let field = NormalizedField::new("age", TypeCategory::Uint);
        assert_eq!(
            GenericDialect.alter_column("users", &field),
            "ALTER TABLE users MODIFY COLUMN age INTEGER UNSIGNED;"
        );
    }
}
