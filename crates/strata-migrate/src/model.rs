//! Declarative model descriptors and the metadata reader.
//!
//! Models are described explicitly with [`ModelDescriptor`] and
//! [`FieldDescriptor`] (in code, or loaded from a JSON manifest) and turned
//! into a [`TableSchema`] by [`read_model`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};
use crate::schema::{ForeignKeyAction, ForeignKeyRef, NormalizedField, TableSchema, TypeCategory};

/// Maps a model name to its table name.
pub trait NamingStrategy {
    /// Returns the table name for the given model name.
    fn table_name(&self, model: &str) -> String;
}

/// Snake-cased, pluralized model names: `BlogPost` becomes `blog_posts`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PluralSnakeCase;

impl NamingStrategy for PluralSnakeCase {
    fn table_name(&self, model: &str) -> String {
        pluralize(&to_snake_case(model))
    }
}

fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let chars: Vec<char> = name.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev_lower = i > 0 && (chars[i - 1].is_lowercase() || chars[i - 1].is_ascii_digit());
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let prev_upper = i > 0 && chars[i - 1].is_uppercase();
            if i > 0 && (prev_lower || (prev_upper && next_lower)) && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn pluralize(word: &str) -> String {
    let consonant_y = word.len() > 1
        && word.ends_with('y')
        && !word[..word.len() - 1].ends_with(['a', 'e', 'i', 'o', 'u']);
    if consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if word.ends_with('s')
        || word.ends_with('x')
        || word.ends_with('z')
        || word.ends_with("ch")
        || word.ends_with("sh")
    {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

/// Foreign key target as declared on a model field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyTarget {
    /// Referenced table name.
    pub table: String,
    /// Referenced column, `id` when omitted.
    #[serde(default)]
    pub column: Option<String>,
    /// ON DELETE action.
    #[serde(default)]
    pub on_delete: Option<ForeignKeyAction>,
}

/// One declared model field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Column name.
    pub name: String,
    /// Declared type, e.g. `CharField`, `IntegerField`, `i64`, `String`.
    #[serde(rename = "type")]
    pub declared_type: String,
    /// NOT NULL when true.
    #[serde(default)]
    pub required: bool,
    /// UNIQUE when true.
    #[serde(default)]
    pub unique: bool,
    /// Part of the primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Auto-incrementing column.
    #[serde(default)]
    pub auto_increment: bool,
    /// Foreign key target.
    #[serde(default)]
    pub foreign_key: Option<ForeignKeyTarget>,
    /// Default value as an SQL literal.
    #[serde(default)]
    pub default: Option<String>,
}

impl FieldDescriptor {
    /// Creates an optional field of the given declared type.
    #[must_use]
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            required: false,
            unique: false,
            primary_key: false,
            auto_increment: false,
            foreign_key: None,
            default: None,
        }
    }

    /// Marks the field NOT NULL.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the field UNIQUE.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the field as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks the field auto-incrementing.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// References `table.id`.
    #[must_use]
    pub fn references(mut self, table: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKeyTarget {
            table: table.into(),
            column: None,
            on_delete: None,
        });
        self
    }

    /// Sets the ON DELETE action of the foreign key, if one is declared.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        if let Some(fk) = self.foreign_key.as_mut() {
            fk.on_delete = Some(action);
        }
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// A many-to-many relation to another table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManyToMany {
    /// The related table name.
    pub to: String,
    /// Explicit join table name.
    #[serde(default)]
    pub join_table: Option<String>,
}

/// A registered data model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Model name, e.g. `BlogPost`.
    pub name: String,
    /// Explicit table name overriding the naming strategy.
    #[serde(default)]
    pub table: Option<String>,
    /// Declared fields in order.
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    /// Many-to-many relations.
    #[serde(default)]
    pub many_to_many: Vec<ManyToMany>,
}

impl ModelDescriptor {
    /// Creates a model with no fields.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            fields: Vec::new(),
            many_to_many: Vec::new(),
        }
    }

    /// Overrides the table name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a many-to-many relation to `table`.
    #[must_use]
    pub fn many_to_many(mut self, table: impl Into<String>) -> Self {
        self.many_to_many.push(ManyToMany {
            to: table.into(),
            join_table: None,
        });
        self
    }

    /// Resolves the table name with the given strategy.
    #[must_use]
    pub fn table_name(&self, naming: &dyn NamingStrategy) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| naming.table_name(&self.name))
    }
}

/// Ordered list of registered models.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRegistry {
    /// Registered models, in registration order.
    pub models: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model.
    #[must_use]
    pub fn register(mut self, model: ModelDescriptor) -> Self {
        self.models.push(model);
        self
    }

    /// Parses a registry from a JSON manifest.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a registry from a JSON manifest on disk.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Gets a model by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.name == name)
    }

    /// Returns the selected models, or all of them when `names` is empty.
    ///
    /// Unknown names are reported as [`MigrateError::InvalidState`].
    pub fn select(&self, names: &[String]) -> Result<Vec<&ModelDescriptor>> {
        if names.is_empty() {
            return Ok(self.models.iter().collect());
        }
        names
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| {
                    MigrateError::InvalidState(format!("Model '{name}' is not registered"))
                })
            })
            .collect()
    }
}

/// How a declared type maps onto the schema.
struct TypeMapping {
    category: TypeCategory,
    auto_key: bool,
}

fn map_declared_type(declared: &str) -> Option<TypeMapping> {
    let normalized = declared.trim().to_ascii_lowercase();
    let (category, auto_key) = match normalized.as_str() {
        "autofield" | "bigautofield" | "smallautofield" => (TypeCategory::Int, true),
        "booleanfield" | "bool" | "boolean" => (TypeCategory::Bool, false),
        "integerfield" | "bigintegerfield" | "smallintegerfield" | "foreignkey"
        | "onetoonefield" | "i8" | "i16" | "i32" | "i64" | "isize" | "int" | "integer" => {
            (TypeCategory::Int, false)
        }
        "positiveintegerfield" | "positivebigintegerfield" | "positivesmallintegerfield"
        | "u8" | "u16" | "u32" | "u64" | "usize" | "uint" => (TypeCategory::Uint, false),
        "floatfield" | "decimalfield" | "f32" | "f64" | "float" | "double" => {
            (TypeCategory::Float, false)
        }
        "charfield" | "textfield" | "emailfield" | "slugfield" | "urlfield" | "uuidfield"
        | "jsonfield" | "string" | "str" | "text" | "uuid" => (TypeCategory::String, false),
        "datetimefield" | "datefield" | "timefield" | "durationfield" | "datetime" | "date"
        | "time" | "naivedatetime" | "naivedate" | "timestamp" => (TypeCategory::Time, false),
        "binaryfield" | "vec<u8>" | "bytes" | "blob" => (TypeCategory::Bytes, false),
        _ => return None,
    };
    Some(TypeMapping { category, auto_key })
}

/// Reads a model descriptor into a normalized table schema.
///
/// Fails with [`MigrateError::Metadata`] when a field's declared type has
/// no SQL type category.
pub fn read_model(model: &ModelDescriptor, naming: &dyn NamingStrategy) -> Result<TableSchema> {
    let mut table = TableSchema::new(model.table_name(naming));

    for descriptor in &model.fields {
        let mapping =
            map_declared_type(&descriptor.declared_type).ok_or_else(|| MigrateError::Metadata {
                model: model.name.clone(),
                field: descriptor.name.clone(),
                declared: descriptor.declared_type.clone(),
            })?;

        let mut field = NormalizedField::new(&descriptor.name, mapping.category);
        if descriptor.required {
            field = field.not_null();
        }
        if descriptor.primary_key || mapping.auto_key {
            field = field.primary_key();
        }
        if descriptor.auto_increment || mapping.auto_key {
            field = field.auto_increment();
        }
        if descriptor.unique {
            field = field.unique();
        }
        if let Some(target) = &descriptor.foreign_key {
            let mut reference = ForeignKeyRef::new(
                &target.table,
                target.column.clone().unwrap_or_else(|| "id".to_string()),
            );
            reference.on_delete = target.on_delete;
            field = field.references(reference);
        }
        if let Some(default) = &descriptor.default {
            field = field.default_value(default);
        }

        table.insert_field(field);
    }

    Ok(table)
}
