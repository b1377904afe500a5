//! In-memory migration plans.

use serde::{Deserialize, Serialize};

use crate::dialect::{MigrationDialect, dedupe_create_tables};
use crate::operations::Operation;
use crate::resolver::TableInfo;
use crate::writer::describe_operations;

/// A rendered migration: its operations plus the Up and Down statements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    /// Ordinal or timestamp id, assigned by the writer when `None`.
    pub id: Option<String>,
    /// Slug describing the change.
    pub name: String,
    /// The operations, in application order.
    pub operations: Vec<Operation>,
    /// Statements applied going forward.
    pub up: Vec<String>,
    /// Statements undoing `up`, in execution order.
    pub down: Vec<String>,
}

impl Migration {
    /// Renders a migration from diff operations.
    ///
    /// Down statements are the per-operation reverses in reverse order.
    #[must_use]
    pub fn from_operations(operations: Vec<Operation>, dialect: &dyn MigrationDialect) -> Self {
        let up = operations.iter().flat_map(|op| dialect.up_sql(op)).collect();
        let down = operations
            .iter()
            .rev()
            .flat_map(|op| dialect.down_sql(op))
            .collect();
        Self {
            id: None,
            name: describe_operations(&operations),
            operations,
            up,
            down,
        }
    }

    /// Renders the initial migration from resolved tables.
    ///
    /// Up creates the tables in dependency order, Down drops them in
    /// reverse order.
    #[must_use]
    pub fn initial(tables: &[TableInfo], dialect: &dyn MigrationDialect) -> Self {
        let operations: Vec<Operation> = tables
            .iter()
            .map(|t| Operation::create_table(t.schema.clone()))
            .collect();
        let up = dedupe_create_tables(tables.iter().map(|t| t.sql.clone()).collect());
        let down = tables
            .iter()
            .rev()
            .map(|t| dialect.drop_table(&t.name))
            .collect();
        Self {
            id: None,
            name: describe_operations(&operations),
            operations,
            up,
            down,
        }
    }

    /// Overrides the generated name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Returns true if the migration changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Renders the file body.
    #[must_use]
    pub fn render(&self) -> String {
        let mut body = String::from("-- +migrate Up\n");
        for statement in &self.up {
            body.push_str(statement);
            body.push('\n');
        }
        body.push_str("\n-- +migrate Down\n");
        for statement in &self.down {
            body.push_str(statement);
            body.push('\n');
        }
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{Dialect, SqliteDialect};
    use crate::resolver::TableGraph;
    use crate::schema::{NormalizedField, TableSchema, TypeCategory};

    #[test]
    fn test_from_operations_reverses_down() {
        let ops = vec![
            Operation::add_column("users", NormalizedField::new("age", TypeCategory::Int)),
            Operation::add_column("users", NormalizedField::new("bio", TypeCategory::String)),
        ];
        let migration = Migration::from_operations(ops, &SqliteDialect);
        assert_eq!(migration.name, "add_2_fields_to_users");
        assert_eq!(
            migration.up,
            vec![
                "ALTER TABLE users ADD COLUMN age INTEGER;",
                "ALTER TABLE users ADD COLUMN bio VARCHAR(255);",
            ]
        );
        assert_eq!(
            migration.down,
            vec![
                "ALTER TABLE users DROP COLUMN bio;",
                "ALTER TABLE users DROP COLUMN age;",
            ]
        );
    }

    #[test]
    fn test_initial_drops_in_reverse() {
        let mut graph = TableGraph::new(Dialect::Sqlite);
        graph.add_table(
            TableSchema::new("accounts")
                .field(NormalizedField::new("id", TypeCategory::Int).primary_key()),
        );
        graph.add_table(
            TableSchema::new("posts")
                .field(NormalizedField::new("id", TypeCategory::Int).primary_key())
                .field(
                    NormalizedField::new("account_id", TypeCategory::Int)
                        .references(crate::schema::ForeignKeyRef::new("accounts", "id")),
                ),
        );
        let tables = graph.resolve().unwrap();
        let migration = Migration::initial(&tables, &SqliteDialect);

        assert_eq!(migration.name, "create_accounts_posts");
        assert_eq!(migration.up.len(), 2);
        assert_eq!(
            migration.down,
            vec!["DROP TABLE IF EXISTS posts;", "DROP TABLE IF EXISTS accounts;"]
        );
    }

    #[test]
    fn test_render_layout() {
        let migration = Migration::from_operations(
            vec![Operation::add_column(
                "users",
                NormalizedField::new("age", TypeCategory::Int),
            )],
            &SqliteDialect,
        );
        assert_eq!(
            migration.render(),
            "-- +migrate Up\n\
             ALTER TABLE users ADD COLUMN age INTEGER;\n\
             \n\
             -- +migrate Down\n\
             ALTER TABLE users DROP COLUMN age;\n"
        );
    }

    #[test]
    fn test_name_override() {
        let migration = Migration::from_operations(Vec::new(), &SqliteDialect).with_name("noop");
        assert!(migration.is_empty());
        assert_eq!(migration.name, "noop");
    }
}
