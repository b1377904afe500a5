//! Dependency resolution for initial table creation.
//!
//! [`TableGraph`] is built fresh for each generation run. Tables are added
//! with their foreign keys, many-to-many relations become synthesized join
//! tables, and [`TableGraph::resolve`] returns the tables in an order where
//! every referenced table is created before the tables pointing at it.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::debug;

use crate::dialect::Dialect;
use crate::error::{MigrateError, Result};
use crate::schema::{ForeignKeyAction, ForeignKeyRef, NormalizedField, TableSchema, TypeCategory};

/// A table scheduled for creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
    /// Tables that must exist first.
    pub dependencies: Vec<String>,
    /// Rendered `CREATE TABLE` statement.
    pub sql: String,
    /// The table definition.
    pub schema: TableSchema,
}

/// Per-run arena of tables keyed by name.
#[derive(Debug)]
pub struct TableGraph {
    dialect: Dialect,
    tables: BTreeMap<String, TableInfo>,
    existing: BTreeSet<String>,
}

impl TableGraph {
    /// Creates an empty graph rendering DDL with `dialect`.
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            tables: BTreeMap::new(),
            existing: BTreeSet::new(),
        }
    }

    /// Marks tables as already present in the database.
    ///
    /// A dependency on an existing table is satisfied without ordering, and
    /// the existing table itself is never visited.
    pub fn assume_existing<I, S>(&mut self, tables: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.existing.extend(tables.into_iter().map(Into::into));
    }

    /// Number of tables in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if no table was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Gets a table by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    /// Adds a table. Its foreign keys become dependencies, except
    /// references to itself. A table already present is kept as is.
    pub fn add_table(&mut self, schema: TableSchema) {
        if self.tables.contains_key(&schema.name) {
            debug!(table = %schema.name, "Table already in graph, keeping first definition");
            return;
        }

        let mut dependencies: Vec<String> = Vec::new();
        for table in schema.referenced_tables() {
            if !dependencies.iter().any(|d| d == table) {
                dependencies.push(table.to_string());
            }
        }

        let info = TableInfo {
            name: schema.name.clone(),
            dependencies,
            sql: self.dialect.implementation().create_table(&schema),
            schema,
        };
        self.tables.insert(info.name.clone(), info);
    }

    /// Synthesizes the join table of a many-to-many relation and returns
    /// its name.
    ///
    /// Participants are ordered alphabetically, so `(tags, posts)` and
    /// `(posts, tags)` yield the same `posts_tags` table. The table has one
    /// NOT NULL integer column per participant, a composite primary key and
    /// two cascading foreign keys.
    pub fn add_many_to_many(&mut self, left: &str, right: &str, join_name: Option<&str>) -> String {
        let (first, second) = if left <= right {
            (left, right)
        } else {
            (right, left)
        };
        let name = join_name.map_or_else(|| format!("{first}_{second}"), str::to_string);

        let first_column = format!("{first}_id");
        let second_column = if first == second {
            format!("related_{second}_id")
        } else {
            format!("{second}_id")
        };

        let join_column = |column: &str, target: &str| {
            NormalizedField::new(column, TypeCategory::Int)
                .primary_key()
                .references(ForeignKeyRef::new(target, "id").on_delete(ForeignKeyAction::Cascade))
        };
        let schema = TableSchema::new(&name)
            .field(join_column(&first_column, first))
            .field(join_column(&second_column, second));

        self.add_table(schema);
        name
    }

    /// Orders the tables for creation.
    ///
    /// Tables without dependencies come first, sorted by name. The rest
    /// follow in depth-first post-order, visiting tables by name. A
    /// dependency on a table that was never added fails with
    /// [`MigrateError::UnknownTable`]; a cycle fails with
    /// [`MigrateError::CyclicDependency`].
    pub fn resolve(&self) -> Result<Vec<TableInfo>> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut order: Vec<&str> = Vec::new();

        for (name, info) in &self.tables {
            if info.dependencies.is_empty() {
                visited.insert(name);
                order.push(name);
            }
        }

        let mut stack = Vec::new();
        for name in self.tables.keys() {
            self.visit(name, &mut visited, &mut stack, &mut order)?;
        }

        debug!(order = ?order, "Resolved table creation order");
        Ok(order
            .into_iter()
            .filter_map(|name| self.tables.get(name).cloned())
            .collect())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
        order: &mut Vec<&'a str>,
    ) -> Result<()> {
        if visited.contains(name) {
            return Ok(());
        }
        if let Some(position) = stack.iter().position(|s| *s == name) {
            let mut cycle: Vec<String> = stack[position..].iter().map(|s| s.to_string()).collect();
            cycle.push(name.to_string());
            return Err(MigrateError::CyclicDependency { cycle });
        }

        let Some(info) = self.tables.get(name) else {
            return Ok(());
        };

        stack.push(name);
        for dependency in &info.dependencies {
            if self.existing.contains(dependency) {
                continue;
            }
            if !self.tables.contains_key(dependency) {
                return Err(MigrateError::UnknownTable {
                    table: dependency.clone(),
                    referenced_by: name.to_string(),
                });
            }
            self.visit(dependency, visited, stack, order)?;
        }
        stack.pop();

        visited.insert(name);
        order.push(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, references: &[&str]) -> TableSchema {
        let mut schema = TableSchema::new(name).field(
            NormalizedField::new("id", TypeCategory::Int)
                .primary_key()
                .auto_increment(),
        );
        for target in references {
            schema = schema.field(
                NormalizedField::new(format!("{}_id", target.trim_end_matches('s')), TypeCategory::Int)
                    .references(ForeignKeyRef::new(*target, "id")),
            );
        }
        schema
    }

    fn names(tables: &[TableInfo]) -> Vec<&str> {
        tables.iter().map(|t| t.name.as_str()).collect()
    }

    #[test]
    fn test_chain_resolves_dependencies_first() {
        let mut graph = TableGraph::new(Dialect::Sqlite);
        graph.add_table(table("posts", &["accounts"]));
        graph.add_table(table("accounts", &["roles"]));
        graph.add_table(table("roles", &[]));

        let order = graph.resolve().unwrap();
        assert_eq!(names(&order), vec!["roles", "accounts", "posts"]);
        assert!(order[0].sql.starts_with("CREATE TABLE IF NOT EXISTS roles"));
    }

    #[test]
    fn test_independent_tables_sorted_first() {
        let mut graph = TableGraph::new(Dialect::Sqlite);
        graph.add_table(table("comments", &["posts"]));
        graph.add_table(table("zebras", &[]));
        graph.add_table(table("posts", &[]));
        graph.add_table(table("apples", &[]));

        let order = graph.resolve().unwrap();
        assert_eq!(names(&order), vec!["apples", "posts", "zebras", "comments"]);
    }

    #[test]
    fn test_self_reference_is_not_an_edge() {
        let mut graph = TableGraph::new(Dialect::Sqlite);
        graph.add_table(table("categories", &["categories"]));
        let order = graph.resolve().unwrap();
        assert_eq!(names(&order), vec!["categories"]);
        assert!(order[0].dependencies.is_empty());
    }

    #[test]
    fn test_unknown_table() {
        let mut graph = TableGraph::new(Dialect::Sqlite);
        graph.add_table(table("posts", &["accounts"]));
        match graph.resolve().unwrap_err() {
            MigrateError::UnknownTable {
                table,
                referenced_by,
            } => {
                assert_eq!(table, "accounts");
                assert_eq!(referenced_by, "posts");
            }
            other => panic!("Expected UnknownTable, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut graph = TableGraph::new(Dialect::Sqlite);
        graph.add_table(table("a", &["b"]));
        graph.add_table(table("b", &["a"]));
        match graph.resolve().unwrap_err() {
            MigrateError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec!["a", "b", "a"]);
            }
            other => panic!("Expected CyclicDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_many_to_many_synthesis() {
        let mut graph = TableGraph::new(Dialect::Sqlite);
        graph.add_table(table("posts", &[]));
        graph.add_table(table("tags", &[]));
        let first = graph.add_many_to_many("tags", "posts", None);
        let second = graph.add_many_to_many("posts", "tags", None);
        assert_eq!(first, "posts_tags");
        assert_eq!(second, "posts_tags");
        assert_eq!(graph.len(), 3);

        let join = graph.get("posts_tags").unwrap();
        assert_eq!(join.dependencies, vec!["posts", "tags"]);
        assert_eq!(join.schema.primary_key, vec!["posts_id", "tags_id"]);
        assert!(join.schema.fields.iter().all(|f| !f.nullable));
        assert!(join.sql.contains("PRIMARY KEY (posts_id, tags_id)"));
        assert!(join.sql.contains(
            "CONSTRAINT fk_posts_tags_tags_id FOREIGN KEY (tags_id) REFERENCES tags(id) ON DELETE CASCADE"
        ));

        let order = graph.resolve().unwrap();
        assert_eq!(names(&order), vec!["posts", "tags", "posts_tags"]);
    }

    #[test]
    fn test_self_many_to_many() {
        let mut graph = TableGraph::new(Dialect::Sqlite);
        graph.add_table(table("users", &[]));
        let name = graph.add_many_to_many("users", "users", Some("friendships"));
        assert_eq!(name, "friendships");

        let join = graph.get("friendships").unwrap();
        assert_eq!(join.dependencies, vec!["users"]);
        let columns: Vec<&str> = join.schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(columns, vec!["users_id", "related_users_id"]);
    }

    #[test]
    fn test_existing_tables_satisfy_dependencies() {
        let mut graph = TableGraph::new(Dialect::Sqlite);
        graph.add_table(table("posts", &["accounts"]));
        graph.add_table(table("comments", &["posts", "accounts"]));
        graph.assume_existing(["accounts"]);

        let order = graph.resolve().unwrap();
        assert_eq!(names(&order), vec!["posts", "comments"]);
    }

    #[test]
    fn test_existing_tables_break_cycles() {
        let mut graph = TableGraph::new(Dialect::Sqlite);
        graph.add_table(table("a", &["b"]));
        graph.add_table(table("b", &["a"]));
        graph.assume_existing(["a", "b"]);

        let order = graph.resolve().unwrap();
        assert_eq!(names(&order), vec!["a", "b"]);
    }
}
