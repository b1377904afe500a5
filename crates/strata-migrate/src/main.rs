//! strata-migrate CLI
//!
//! Command-line tool for generating and applying SQL migrations.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use strata_migrate::prelude::*;

/// Schema diffing and replayable SQL migrations.
#[derive(Parser)]
#[command(name = "strata-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Migrations directory. Repeat to read several; new files go into the first.
    #[arg(short, long = "migrations-dir", default_value = "migrations")]
    migrations_dir: Vec<PathBuf>,

    /// JSON model manifest.
    #[arg(long, env = "STRATA_MODELS", default_value = "models.json")]
    models: PathBuf,

    /// DDL dialect of generated migrations.
    #[arg(long, env = "STRATA_DIALECT", value_enum, default_value_t = Dialect::Sqlite)]
    dialect: Dialect,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a migration from model changes.
    #[command(name = "makemigrations")]
    MakeMigrations {
        /// Models to include (all registered models if not specified).
        models: Vec<String>,

        /// Emit CREATE TABLE statements for every model instead of diffing
        /// against the database.
        #[arg(long)]
        initial: bool,

        /// Migration name.
        #[arg(short, long)]
        name: Option<String>,

        /// Use timestamp ids instead of sequence numbers.
        #[arg(long)]
        timestamp: bool,

        /// Drop a live table no model declares. Repeat for several.
        #[arg(long = "drop-table", value_name = "TABLE")]
        drop_tables: Vec<String>,

        /// Print the migration without writing it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply pending migrations.
    Migrate {
        /// Roll back migrations instead of applying.
        #[arg(short, long)]
        rollback: bool,

        /// Number of migrations to roll back.
        #[arg(short, long, default_value_t = 1)]
        steps: usize,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Show migration status.
    #[command(name = "showmigrations")]
    ShowMigrations,

    /// Initialize the migrations system (create the ledger table).
    Init,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error: {err}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = MigrateConfig::default()
        .database_url(cli.database)
        .migrations_dirs(cli.migrations_dir)
        .models_file(cli.models)
        .dialect(cli.dialect);

    let pool = config.connect().await?;

    match cli.command {
        Commands::Init => {
            info!("Initializing migrations system...");
            MigrationLedger::new(pool.clone()).ensure_table().await?;
            info!("Ledger table created successfully.");
        }

        Commands::MakeMigrations {
            models,
            initial,
            name,
            timestamp,
            drop_tables,
            dry_run,
        } => {
            if timestamp {
                config = config.id_scheme(IdScheme::Timestamp);
            }
            let registry = ModelRegistry::load(&config.models_file).map_err(|err| {
                anyhow!(
                    "Failed to load models from '{}': {err}",
                    config.models_file.display()
                )
            })?;
            let options = GenerateOptions {
                initial,
                name,
                models,
                drop_tables,
                dry_run,
            };

            let report =
                make_migrations(&pool, &registry, &PluralSnakeCase, &config, &options).await?;
            for failure in &report.failures {
                warn!("{failure}");
            }

            match (&report.migration, &report.path) {
                (Some(migration), None) => {
                    println!("-- {}", migration.name);
                    print!("{}", migration.render());
                }
                (Some(_), Some(path)) => info!("Created migration: {}", path.display()),
                (None, _) => info!("No changes detected."),
            }
        }

        Commands::Migrate {
            rollback,
            steps,
            dry_run,
        } => {
            let runner = MigrationRunner::new(&pool, config.migrations_dirs.clone()).dry_run(dry_run);
            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
            }

            let report = if rollback {
                runner.rollback(steps).await?
            } else {
                runner.apply().await?
            };
            info!(
                files = report.executed.len(),
                statements = report.statements,
                "Done"
            );
        }

        Commands::ShowMigrations => {
            let runner = MigrationRunner::new(&pool, config.migrations_dirs.clone());
            let statuses = runner.status().await?;

            if statuses.is_empty() {
                info!("No migration files found.");
            } else {
                println!("\nMigrations:");
                println!("{:-<60}", "");
                for status in &statuses {
                    match status.applied_at {
                        Some(at) => println!(
                            " [X] {} ({})",
                            status.filename,
                            at.format("%Y-%m-%d %H:%M:%S")
                        ),
                        None => println!(" [ ] {}", status.filename),
                    }
                }
                println!();
            }
        }
    }

    pool.close().await;
    Ok(())
}
