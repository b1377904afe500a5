//! Schema diffing and replayable SQL migrations for declarative models.
//!
//! `strata-migrate` compares what the models declare against what the
//! database holds and writes the difference as a plain SQL file with an Up
//! and a Down section:
//! - Models are described with [`model::ModelDescriptor`] builders or a
//!   JSON manifest
//! - The live schema is read from the SQLite catalog
//! - New tables are created in foreign-key-safe order
//! - Applied files are recorded in a ledger table and can be rolled back
//!
//! # Architecture
//!
//! - **Model** - Reads model descriptors into normalized table schemas
//! - **Introspect** - Reads the live database into the same representation
//! - **Diff** - Computes column operations between two tables
//! - **Resolver** - Orders table creation by foreign key dependencies
//! - **Dialect** - Renders operations as SQLite, MySQL or generic DDL
//! - **Writer** - Names and writes migration files
//! - **Runner** - Applies and rolls back files, tracking them in the ledger
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_migrate::prelude::*;
//!
//! let registry = ModelRegistry::new().register(
//!     ModelDescriptor::new("User")
//!         .field(FieldDescriptor::new("id", "AutoField"))
//!         .field(FieldDescriptor::new("username", "CharField").required().unique())
//!         .field(FieldDescriptor::new("email", "EmailField").required().unique()),
//! );
//!
//! let config = MigrateConfig::default();
//! let pool = config.connect().await?;
//! let options = GenerateOptions::default();
//! make_migrations(&pool, &registry, &PluralSnakeCase, &config, &options).await?;
//!
//! MigrationRunner::new(&pool, config.migrations_dirs.clone())
//!     .apply()
//!     .await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Generate a migration from model changes
//! strata-migrate makemigrations
//!
//! # Apply pending migrations
//! strata-migrate migrate
//!
//! # Show migration status
//! strata-migrate showmigrations
//!
//! # Roll back the last migration
//! strata-migrate migrate --rollback
//! ```

pub mod config;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod generate;
pub mod introspect;
pub mod ledger;
pub mod migration;
pub mod model;
pub mod operations;
pub mod resolver;
pub mod runner;
pub mod schema;
pub mod writer;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::MigrateConfig;
    pub use crate::dialect::{
        Dialect, GenericDialect, MigrationDialect, MySqlDialect, SqliteDialect,
        dedupe_create_tables,
    };
    pub use crate::diff::{diff_schemas, diff_table};
    pub use crate::error::{MigrateError, Result};
    pub use crate::generate::{
        GenerateOptions, GenerationReport, ModelSchemas, make_migrations, plan_changes, plan_diff,
        plan_initial,
    };
    pub use crate::introspect::{IntrospectOptions, classify_column_type, introspect_schema};
    pub use crate::ledger::MigrationLedger;
    pub use crate::migration::Migration;
    pub use crate::model::{
        FieldDescriptor, ManyToMany, ModelDescriptor, ModelRegistry, NamingStrategy,
        PluralSnakeCase, read_model,
    };
    pub use crate::operations::{Operation, OperationKind};
    pub use crate::resolver::{TableGraph, TableInfo};
    pub use crate::runner::{MigrationRunner, MigrationScript, RunReport, parse_migration};
    pub use crate::schema::{
        ForeignKeyAction, ForeignKeyRef, NormalizedField, TableSchema, TypeCategory,
    };
    pub use crate::writer::{IdScheme, MigrationWriter, describe_operations};
}
