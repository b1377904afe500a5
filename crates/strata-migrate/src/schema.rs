//! Normalized schema representation.
//!
//! Both the model reader (what the code declares) and the introspector
//! (what the database holds) produce these types, so the differ can compare
//! them field by field.

use serde::{Deserialize, Serialize};

/// Engine-agnostic SQL type category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeCategory {
    /// Boolean.
    Bool,
    /// Signed integer.
    Int,
    /// Unsigned integer.
    Uint,
    /// Floating point.
    Float,
    /// Character data.
    String,
    /// Date, time or timestamp.
    Time,
    /// Binary data.
    Bytes,
}

impl TypeCategory {
    /// Returns the lowercase category name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Float => "float",
            Self::String => "string",
            Self::Time => "time",
            Self::Bytes => "bytes",
        }
    }
}

/// Foreign key action (ON DELETE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// Parses the action names reported by `PRAGMA foreign_key_list`.
    #[must_use]
    pub fn from_sql(action: &str) -> Option<Self> {
        match action.trim().to_ascii_uppercase().as_str() {
            "NO ACTION" => Some(Self::NoAction),
            "RESTRICT" => Some(Self::Restrict),
            "CASCADE" => Some(Self::Cascade),
            "SET NULL" => Some(Self::SetNull),
            "SET DEFAULT" => Some(Self::SetDefault),
            _ => None,
        }
    }
}

/// Target of a foreign key column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
    /// ON DELETE action, if declared.
    #[serde(default)]
    pub on_delete: Option<ForeignKeyAction>,
}

impl ForeignKeyRef {
    /// Creates a reference to `table.column`.
    #[must_use]
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            on_delete: None,
        }
    }

    /// Sets the ON DELETE action.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = Some(action);
        self
    }
}

/// A single column, normalized across models and the live database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedField {
    /// Column name.
    pub name: String,
    /// SQL type category.
    pub category: TypeCategory,
    /// Whether the column allows NULL values.
    pub nullable: bool,
    /// Whether this column is part of the primary key.
    pub primary_key: bool,
    /// Whether this column auto-increments.
    pub auto_increment: bool,
    /// Whether this column has a UNIQUE constraint.
    pub unique: bool,
    /// Foreign key target, if any.
    pub foreign_key: Option<ForeignKeyRef>,
    /// Default value as an SQL literal or expression.
    pub default: Option<String>,
}

impl NormalizedField {
    /// Creates a nullable column with no constraints.
    #[must_use]
    pub fn new(name: impl Into<String>, category: TypeCategory) -> Self {
        Self {
            name: name.into(),
            category,
            nullable: true,
            primary_key: false,
            auto_increment: false,
            unique: false,
            foreign_key: None,
            default: None,
        }
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false; // Primary keys are always NOT NULL
        self
    }

    /// Sets the column to auto-increment.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Sets the column as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Adds a foreign key reference.
    #[must_use]
    pub fn references(mut self, target: ForeignKeyRef) -> Self {
        self.foreign_key = Some(target);
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Returns true if both fields describe the same column shape.
    ///
    /// Foreign key targets and defaults only count when both sides declare
    /// them; the catalog cannot always report what the model declared.
    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        let core = self.category == other.category
            && self.nullable == other.nullable
            && self.primary_key == other.primary_key
            && self.auto_increment == other.auto_increment
            && self.unique == other.unique;
        if !core {
            return false;
        }

        let fk_matches = match (&self.foreign_key, &other.foreign_key) {
            (Some(a), Some(b)) => a.table == b.table && a.column == b.column,
            _ => true,
        };
        let default_matches = match (&self.default, &other.default) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        };
        fk_matches && default_matches
    }
}

/// A table: its name and its fields, unique by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<NormalizedField>,
    /// Primary key column(s).
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// Creates a new table schema.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Adds a field to the table.
    #[must_use]
    pub fn field(mut self, field: NormalizedField) -> Self {
        self.insert_field(field);
        self
    }

    /// Inserts a field, replacing any field with the same name in place.
    pub fn insert_field(&mut self, field: NormalizedField) {
        if !field.primary_key {
            self.primary_key.retain(|column| *column != field.name);
        } else if !self.primary_key.contains(&field.name) {
            self.primary_key.push(field.name.clone());
        }
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
    }

    /// Sets the primary key columns.
    #[must_use]
    pub fn primary_key(mut self, columns: Vec<String>) -> Self {
        self.primary_key = columns;
        self
    }

    /// Gets a field by name.
    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&NormalizedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns true if the table declares no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns true if the primary key spans more than one column.
    #[must_use]
    pub fn has_composite_key(&self) -> bool {
        self.primary_key.len() > 1
    }

    /// Tables referenced by this table's foreign keys, excluding itself.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter_map(|f| f.foreign_key.as_ref())
            .map(|fk| fk.table.as_str())
            .filter(move |t| *t != self.name)
    }

    /// Returns true if both tables hold the same field names and every
    /// field pair is equivalent.
    #[must_use]
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self.fields.iter().all(|f| {
                other
                    .get_field(&f.name)
                    .is_some_and(|o| f.is_equivalent(o))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableSchema {
        TableSchema::new("users")
            .field(
                NormalizedField::new("id", TypeCategory::Int)
                    .primary_key()
                    .auto_increment(),
            )
            .field(
                NormalizedField::new("username", TypeCategory::String)
                    .not_null()
                    .unique(),
            )
    }

    #[test]
    fn test_field_builder() {
        let field = NormalizedField::new("id", TypeCategory::Int)
            .primary_key()
            .auto_increment();

        assert_eq!(field.name, "id");
        assert!(field.primary_key);
        assert!(field.auto_increment);
        assert!(!field.nullable); // Primary keys are NOT NULL
    }

    #[test]
    fn test_table_builder_tracks_primary_key() {
        let table = users();
        assert_eq!(table.fields.len(), 2);
        assert_eq!(table.primary_key, vec!["id"]);
    }

    #[test]
    fn test_insert_field_keeps_names_unique() {
        let table = users().field(NormalizedField::new("username", TypeCategory::Bytes));
        assert_eq!(table.fields.len(), 2);
        assert_eq!(table.fields[1].category, TypeCategory::Bytes);
    }

    #[test]
    fn test_equivalence_ignores_one_sided_foreign_key() {
        let declared = NormalizedField::new("account_id", TypeCategory::Int)
            .references(ForeignKeyRef::new("accounts", "id"));
        let introspected = NormalizedField::new("account_id", TypeCategory::Int);
        assert!(declared.is_equivalent(&introspected));

        let elsewhere = NormalizedField::new("account_id", TypeCategory::Int)
            .references(ForeignKeyRef::new("roles", "id"));
        assert!(!declared.is_equivalent(&elsewhere));
    }

    #[test]
    fn test_equivalence_compares_flags() {
        let a = NormalizedField::new("email", TypeCategory::String);
        assert!(!a.is_equivalent(&a.clone().not_null()));
        assert!(!a.is_equivalent(&a.clone().unique()));
        assert!(!a.is_equivalent(&NormalizedField::new("email", TypeCategory::Bytes)));
    }

    #[test]
    fn test_table_equivalence() {
        assert!(users().is_equivalent(&users()));
        let extra = users().field(NormalizedField::new("email", TypeCategory::String));
        assert!(!users().is_equivalent(&extra));
    }

    #[test]
    fn test_referenced_tables_skip_self() {
        let table = TableSchema::new("categories")
            .field(
                NormalizedField::new("parent_id", TypeCategory::Int)
                    .references(ForeignKeyRef::new("categories", "id")),
            )
            .field(
                NormalizedField::new("owner_id", TypeCategory::Int)
                    .references(ForeignKeyRef::new("accounts", "id")),
            );
        let refs: Vec<&str> = table.referenced_tables().collect();
        assert_eq!(refs, vec!["accounts"]);
    }

    #[test]
    fn test_foreign_key_action_parsing() {
        assert_eq!(
            ForeignKeyAction::from_sql("cascade"),
            Some(ForeignKeyAction::Cascade)
        );
        assert_eq!(ForeignKeyAction::from_sql("bogus"), None);
        assert_eq!(ForeignKeyAction::SetNull.to_sql(), "SET NULL");
    }

    #[test]
    fn test_replacing_key_field_updates_primary_key() {
        let mut table = TableSchema::new("memberships")
            .field(NormalizedField::new("user_id", TypeCategory::Int).primary_key())
            .field(NormalizedField::new("group_id", TypeCategory::Int).primary_key());
        assert!(table.has_composite_key());

        table.insert_field(NormalizedField::new("group_id", TypeCategory::Int));
        assert_eq!(table.primary_key, vec!["user_id"]);
        assert!(!table.has_composite_key());
        assert_eq!(table.fields.len(), 2);
    }
}
