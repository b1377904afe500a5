//! Live schema introspection (SQLite).
//!
//! Reads the catalog through `sqlite_master` and the `PRAGMA` table-valued
//! queries, and normalizes what it finds into [`TableSchema`] values that
//! can be compared against model-derived schemas.

use std::collections::{BTreeMap, HashSet};

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::ledger::LEDGER_TABLE;
use crate::schema::{ForeignKeyAction, ForeignKeyRef, NormalizedField, TableSchema, TypeCategory};

/// Options for [`introspect_schema`].
#[derive(Debug, Clone)]
pub struct IntrospectOptions {
    /// Tables never reported (the ledger table by default).
    pub exclude: Vec<String>,
}

impl Default for IntrospectOptions {
    fn default() -> Self {
        Self {
            exclude: vec![LEDGER_TABLE.to_string()],
        }
    }
}

impl IntrospectOptions {
    /// Excludes another table from the result.
    #[must_use]
    pub fn exclude(mut self, table: impl Into<String>) -> Self {
        self.exclude.push(table.into());
        self
    }
}

/// Classifies a declared column type by substring, the way SQLite's own
/// affinity rules do.
#[must_use]
pub fn classify_column_type(declared: &str) -> TypeCategory {
    let upper = declared.to_ascii_uppercase();
    if upper.contains("INT") {
        if upper.contains("UNSIGNED") {
            TypeCategory::Uint
        } else {
            TypeCategory::Int
        }
    } else if upper.contains("CHAR") || upper.contains("TEXT") || upper.contains("CLOB") {
        TypeCategory::String
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        TypeCategory::Float
    } else if upper.contains("BOOL") {
        TypeCategory::Bool
    } else if upper.contains("BLOB") {
        TypeCategory::Bytes
    } else if upper.contains("DATE") || upper.contains("TIME") {
        TypeCategory::Time
    } else {
        TypeCategory::String
    }
}

/// Reads every user table of the database into a map keyed by table name.
///
/// Any catalog failure aborts the whole read; no partial schema is returned.
pub async fn introspect_schema(
    pool: &SqlitePool,
    options: &IntrospectOptions,
) -> Result<BTreeMap<String, TableSchema>> {
    let table_rows = sqlx::query(
        "SELECT name, sql FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .map_err(|source| MigrateError::Introspection {
        table: None,
        source,
    })?;

    let mut tables = BTreeMap::new();
    for row in table_rows {
        let name: String = row.get("name");
        if options.exclude.iter().any(|e| e == &name) {
            continue;
        }
        let create_sql = row.try_get::<Option<String>, _>("sql").map_err(|source| {
            MigrateError::Introspection {
                table: Some(name.clone()),
                source,
            }
        })?;

        let table = introspect_table(pool, &name, create_sql.as_deref())
            .await
            .map_err(|source| MigrateError::Introspection {
                table: Some(name.clone()),
                source,
            })?;
        debug!(table = %name, fields = table.fields.len(), "Introspected table");
        tables.insert(name, table);
    }

    Ok(tables)
}

async fn introspect_table(
    pool: &SqlitePool,
    name: &str,
    create_sql: Option<&str>,
) -> std::result::Result<TableSchema, sqlx::Error> {
    let columns = sqlx::query(&format!("PRAGMA table_info(\"{name}\")"))
        .fetch_all(pool)
        .await?;
    let unique = unique_columns(pool, name).await?;
    let foreign_keys = foreign_keys(pool, name).await?;

    let autoincrement = create_sql
        .is_some_and(|sql| sql.to_ascii_uppercase().contains("AUTOINCREMENT"));

    let mut pk_columns: Vec<(i64, String)> = Vec::new();
    let mut table = TableSchema::new(name);
    for column in &columns {
        let field = read_column(column, &unique, &foreign_keys)?;
        let pk_position: i64 = column.get("pk");
        if pk_position > 0 {
            pk_columns.push((pk_position, field.name.clone()));
        }
        table.insert_field(field);
    }

    pk_columns.sort();
    let primary_key: Vec<String> = pk_columns.into_iter().map(|(_, name)| name).collect();
    // SQLite only accepts AUTOINCREMENT on a single INTEGER PRIMARY KEY.
    if autoincrement && primary_key.len() == 1 {
        if let Some(field) = table.fields.iter_mut().find(|f| f.name == primary_key[0]) {
            field.auto_increment = true;
        }
    }

    Ok(table.primary_key(primary_key))
}

fn read_column(
    row: &SqliteRow,
    unique: &HashSet<String>,
    foreign_keys: &BTreeMap<String, ForeignKeyRef>,
) -> std::result::Result<NormalizedField, sqlx::Error> {
    let name: String = row.get("name");
    let declared: String = row.get("type");
    let notnull: i64 = row.get("notnull");
    let pk: i64 = row.get("pk");
    let default = row.try_get::<Option<String>, _>("dflt_value")?;

    let mut field = NormalizedField::new(&name, classify_column_type(&declared));
    if notnull != 0 {
        field = field.not_null();
    }
    if pk > 0 {
        field = field.primary_key();
    }
    if unique.contains(&name) {
        field = field.unique();
    }
    if let Some(fk) = foreign_keys.get(&name) {
        field = field.references(fk.clone());
    }
    if let Some(default) = default {
        field = field.default_value(default);
    }
    Ok(field)
}

/// Columns covered by a single-column UNIQUE index.
async fn unique_columns(
    pool: &SqlitePool,
    table: &str,
) -> std::result::Result<HashSet<String>, sqlx::Error> {
    let indexes = sqlx::query(&format!("PRAGMA index_list(\"{table}\")"))
        .fetch_all(pool)
        .await?;

    let mut columns = HashSet::new();
    for index in indexes {
        let is_unique: i64 = index.get("unique");
        let origin: String = index.get("origin");
        if is_unique == 0 || origin == "pk" {
            continue;
        }
        let index_name: String = index.get("name");
        let info = sqlx::query(&format!("PRAGMA index_info(\"{index_name}\")"))
            .fetch_all(pool)
            .await?;
        if let [only] = info.as_slice() {
            if let Some(column) = only.try_get::<Option<String>, _>("name")? {
                columns.insert(column);
            }
        }
    }
    Ok(columns)
}

async fn foreign_keys(
    pool: &SqlitePool,
    table: &str,
) -> std::result::Result<BTreeMap<String, ForeignKeyRef>, sqlx::Error> {
    let rows = sqlx::query(&format!("PRAGMA foreign_key_list(\"{table}\")"))
        .fetch_all(pool)
        .await?;

    let mut keys = BTreeMap::new();
    for row in rows {
        let from: String = row.get("from");
        let target: String = row.get("table");
        let to = row.try_get::<Option<String>, _>("to")?;
        let on_delete: String = row.get("on_delete");

        let mut reference = ForeignKeyRef::new(target, to.unwrap_or_else(|| "id".to_string()));
        reference.on_delete = ForeignKeyAction::from_sql(&on_delete);
        keys.insert(from, reference);
    }
    Ok(keys)
}
