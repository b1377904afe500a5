//! Schema operations.
//!
//! An [`Operation`] is one DDL step. Operations are produced by the differ
//! and the dependency resolver, rendered by a dialect, and grouped into a
//! migration.

use serde::{Deserialize, Serialize};

use crate::schema::{NormalizedField, TableSchema, TypeCategory};

/// A single schema change against one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Create a table with all of its fields and constraints.
    CreateTable {
        /// The table to create.
        schema: TableSchema,
    },

    /// Drop a table. Carries its definition so the structure can be
    /// recreated; rows are not restored.
    DropTable {
        /// The table as it exists in the database.
        schema: TableSchema,
    },

    /// Add a column to an existing table.
    AddColumn {
        /// Table name.
        table: String,
        /// The column to add.
        field: NormalizedField,
    },

    /// Drop a column. Carries the dropped column so it can be re-added.
    DropColumn {
        /// Table name.
        table: String,
        /// The column as it exists in the database.
        field: NormalizedField,
    },

    /// Change a column's type or constraints.
    AlterColumn {
        /// Table name.
        table: String,
        /// The desired column.
        field: NormalizedField,
        /// The column as it exists in the database.
        previous: NormalizedField,
    },
}

/// Coarse operation kind, used for naming migrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    /// `CreateTable`.
    Create,
    /// `AddColumn`.
    Add,
    /// `AlterColumn`.
    Alter,
    /// `DropColumn`.
    Remove,
    /// `DropTable`.
    Drop,
}

impl Operation {
    /// Creates an `AddColumn` operation.
    #[must_use]
    pub fn add_column(table: impl Into<String>, field: NormalizedField) -> Self {
        Self::AddColumn {
            table: table.into(),
            field,
        }
    }

    /// Creates a `DropColumn` operation.
    #[must_use]
    pub fn drop_column(table: impl Into<String>, field: NormalizedField) -> Self {
        Self::DropColumn {
            table: table.into(),
            field,
        }
    }

    /// Creates an `AlterColumn` operation.
    #[must_use]
    pub fn alter_column(
        table: impl Into<String>,
        field: NormalizedField,
        previous: NormalizedField,
    ) -> Self {
        Self::AlterColumn {
            table: table.into(),
            field,
            previous,
        }
    }

    /// Creates a `CreateTable` operation.
    #[must_use]
    pub fn create_table(schema: TableSchema) -> Self {
        Self::CreateTable { schema }
    }

    /// Creates a `DropTable` operation.
    #[must_use]
    pub fn drop_table(schema: TableSchema) -> Self {
        Self::DropTable { schema }
    }

    /// Returns the table this operation touches.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { schema } | Self::DropTable { schema } => &schema.name,
            Self::AddColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::AlterColumn { table, .. } => table,
        }
    }

    /// Returns the operation kind.
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::CreateTable { .. } => OperationKind::Create,
            Self::DropTable { .. } => OperationKind::Drop,
            Self::AddColumn { .. } => OperationKind::Add,
            Self::AlterColumn { .. } => OperationKind::Alter,
            Self::DropColumn { .. } => OperationKind::Remove,
        }
    }

    /// Returns the old and new type category of an `AlterColumn`.
    #[must_use]
    pub fn type_change(&self) -> Option<(TypeCategory, TypeCategory)> {
        match self {
            Self::AlterColumn {
                field, previous, ..
            } => Some((previous.category, field.category)),
            _ => None,
        }
    }

    /// Returns the operation that undoes this one.
    #[must_use]
    pub fn reverse(&self) -> Self {
        match self {
            Self::CreateTable { schema } => Self::drop_table(schema.clone()),
            Self::DropTable { schema } => Self::create_table(schema.clone()),
            Self::AddColumn { table, field } => Self::drop_column(table.clone(), field.clone()),
            Self::DropColumn { table, field } => Self::add_column(table.clone(), field.clone()),
            Self::AlterColumn {
                table,
                field,
                previous,
            } => Self::alter_column(table.clone(), previous.clone(), field.clone()),
        }
    }

    /// Returns a human-readable description of this operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateTable { schema } => format!("Create table '{}'", schema.name),
            Self::DropTable { schema } => format!("Drop table '{}'", schema.name),
            Self::AddColumn { table, field } => {
                format!("Add column '{}' to table '{table}'", field.name)
            }
            Self::DropColumn { table, field } => {
                format!("Drop column '{}' from table '{table}'", field.name)
            }
            Self::AlterColumn {
                table,
                field,
                previous,
            } => format!(
                "Alter column '{}' on table '{table}' ({} -> {})",
                field.name,
                previous.category.as_str(),
                field.category.as_str()
            ),
        }
    }
}
