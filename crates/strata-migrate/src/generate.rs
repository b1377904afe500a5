//! Migration generation.
//!
//! Two paths produce a [`Migration`] from the registered models:
//!
//! - the **initial** path resolves every model into dependency order and
//!   emits one `CREATE TABLE` per table;
//! - the **diff** path introspects the live database and emits the
//!   operations reconciling it with the models. Tables missing from the
//!   database are created in dependency order, existing ones are altered
//!   column by column. Tables are dropped only when named explicitly.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use sqlx::sqlite::SqlitePool;
use tracing::{info, warn};

use crate::config::MigrateConfig;
use crate::dialect::MigrationDialect;
use crate::diff::diff_table;
use crate::error::{MigrateError, Result};
use crate::introspect::{IntrospectOptions, introspect_schema};
use crate::migration::Migration;
use crate::model::{ManyToMany, ModelDescriptor, ModelRegistry, NamingStrategy, read_model};
use crate::operations::Operation;
use crate::resolver::TableGraph;
use crate::schema::TableSchema;
use crate::writer::MigrationWriter;

/// Options of a `makemigrations` run.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Use the initial path instead of diffing the live database.
    pub initial: bool,
    /// Explicit migration name.
    pub name: Option<String>,
    /// Model names to include; all registered models when empty.
    pub models: Vec<String>,
    /// Live tables to drop. Tables are only ever dropped when named here.
    pub drop_tables: Vec<String>,
    /// Build the migration without writing it.
    pub dry_run: bool,
}

/// Models read into table schemas.
#[derive(Debug, Default)]
pub struct ModelSchemas {
    /// One table per readable model, in registry order.
    pub tables: Vec<TableSchema>,
    /// Many-to-many relations as `(owning table, relation)`.
    pub relations: Vec<(String, ManyToMany)>,
    /// Models that could not be read. Each failure skips only its model.
    pub failures: Vec<MigrateError>,
}

impl ModelSchemas {
    /// Reads the given models. Unreadable models are collected in
    /// `failures` and left out.
    #[must_use]
    pub fn read(models: &[&ModelDescriptor], naming: &dyn NamingStrategy) -> Self {
        let mut schemas = Self::default();
        for model in models {
            match read_model(model, naming) {
                Ok(table) => {
                    for relation in &model.many_to_many {
                        schemas.relations.push((table.name.clone(), relation.clone()));
                    }
                    schemas.tables.push(table);
                }
                Err(err) => {
                    warn!(model = %model.name, error = %err, "Skipping model");
                    schemas.failures.push(err);
                }
            }
        }
        schemas
    }

    /// Builds the creation graph of every model table and join table, and
    /// returns it with the set of desired table names.
    fn graph(&self, config: &MigrateConfig) -> (TableGraph, BTreeSet<String>) {
        let mut graph = TableGraph::new(config.dialect);
        let mut desired = BTreeSet::new();
        for table in &self.tables {
            desired.insert(table.name.clone());
            graph.add_table(table.clone());
        }
        for (owner, relation) in &self.relations {
            let join = graph.add_many_to_many(owner, &relation.to, relation.join_table.as_deref());
            desired.insert(join);
        }
        (graph, desired)
    }
}

/// Outcome of [`make_migrations`].
#[derive(Debug, Default)]
pub struct GenerationReport {
    /// The generated migration, `None` when nothing changed.
    pub migration: Option<Migration>,
    /// Where the migration was written; `None` for dry runs.
    pub path: Option<PathBuf>,
    /// Models skipped because of metadata errors.
    pub failures: Vec<MigrateError>,
}

/// Plans the initial migration: every table, created in dependency order.
pub fn plan_initial(schemas: &ModelSchemas, config: &MigrateConfig) -> Result<Option<Migration>> {
    let (graph, _) = schemas.graph(config);
    if graph.is_empty() {
        return Ok(None);
    }
    let tables = graph.resolve()?;
    Ok(Some(Migration::initial(
        &tables,
        config.dialect.implementation(),
    )))
}

/// Plans the migration reconciling the live database with the models.
///
/// The live schema is read completely before anything is planned; an
/// introspection failure aborts the run. Live tables no model declares
/// are left alone.
pub async fn plan_diff(
    pool: &SqlitePool,
    schemas: &ModelSchemas,
    config: &MigrateConfig,
) -> Result<Option<Migration>> {
    plan_changes(pool, schemas, config, &[]).await
}

/// Like [`plan_diff`], additionally dropping the named live tables.
///
/// Every planned operation is checked against the dialect first, so a
/// change the database cannot apply fails here instead of producing a
/// migration that never converges.
pub async fn plan_changes(
    pool: &SqlitePool,
    schemas: &ModelSchemas,
    config: &MigrateConfig,
    drop_tables: &[String],
) -> Result<Option<Migration>> {
    let live = introspect_schema(pool, &IntrospectOptions::default()).await?;
    let dialect = config.dialect.implementation();
    let (mut graph, desired) = schemas.graph(config);
    graph.assume_existing(live.keys().cloned());

    let mut operations = Vec::new();
    for info in graph.resolve()? {
        match live.get(&info.name) {
            None => operations.push(Operation::create_table(info.schema)),
            Some(current) => {
                let wanted = normalize_table(&info.schema, dialect);
                operations.extend(diff_table(Some(current), &wanted));
            }
        }
    }
    operations.extend(plan_drops(&live, schemas, &desired, drop_tables, config)?);

    for operation in &operations {
        dialect.check_operation(operation)?;
    }

    if operations.is_empty() {
        return Ok(None);
    }
    Ok(Some(Migration::from_operations(operations, dialect)))
}

fn normalize_table(schema: &TableSchema, dialect: &dyn MigrationDialect) -> TableSchema {
    let mut table = schema.clone();
    table.fields = schema
        .fields
        .iter()
        .map(|f| dialect.normalize_field(f))
        .collect();
    table
}

/// Drops in reverse dependency order, so referencing tables go first.
fn plan_drops(
    live: &BTreeMap<String, TableSchema>,
    schemas: &ModelSchemas,
    desired: &BTreeSet<String>,
    names: &[String],
    config: &MigrateConfig,
) -> Result<Vec<Operation>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let mut graph = TableGraph::new(config.dialect);
    for name in names {
        if desired.contains(name) {
            return Err(MigrateError::InvalidState(format!(
                "Table '{name}' is still declared by a model"
            )));
        }
        if let Some(owner) = schemas
            .tables
            .iter()
            .find(|t| t.referenced_tables().any(|r| r == name))
        {
            return Err(MigrateError::InvalidState(format!(
                "Table '{name}' is still referenced by '{}'",
                owner.name
            )));
        }
        let Some(schema) = live.get(name) else {
            return Err(MigrateError::InvalidState(format!(
                "Table '{name}' does not exist"
            )));
        };
        info!(table = %name, "Dropping table");
        graph.add_table(schema.clone());
        let kept: Vec<String> = schema
            .referenced_tables()
            .filter(|r| !names.iter().any(|n| n == r))
            .map(String::from)
            .collect();
        graph.assume_existing(kept);
    }

    Ok(graph
        .resolve()?
        .into_iter()
        .rev()
        .map(|info| Operation::drop_table(info.schema))
        .collect())
}

/// Generates at most one migration file for the selected models.
pub async fn make_migrations(
    pool: &SqlitePool,
    registry: &ModelRegistry,
    naming: &dyn NamingStrategy,
    config: &MigrateConfig,
    options: &GenerateOptions,
) -> Result<GenerationReport> {
    let selected = registry.select(&options.models)?;
    let schemas = ModelSchemas::read(&selected, naming);

    let planned = if options.initial {
        if !options.drop_tables.is_empty() {
            return Err(MigrateError::InvalidState(
                "Tables can only be dropped when diffing against the database".to_string(),
            ));
        }
        plan_initial(&schemas, config)?
    } else {
        plan_changes(pool, &schemas, config, &options.drop_tables).await?
    };

    let mut report = GenerationReport {
        failures: schemas.failures,
        ..GenerationReport::default()
    };

    let Some(mut migration) = planned else {
        info!("No changes detected");
        return Ok(report);
    };
    if let Some(name) = &options.name {
        migration = migration.with_name(name);
    }

    if !options.dry_run {
        let writer = MigrationWriter::new(config.output_dir(), config.id_scheme);
        report.path = Some(writer.write(&migration)?);
    }
    report.migration = Some(migration);
    Ok(report)
}
