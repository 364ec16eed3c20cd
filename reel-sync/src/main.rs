//! reel-sync - command-line front end for the Reel catalog engine
//!
//! Plays the file-ingestion collaborator: reads a JSON array of rows from
//! disk and hands it to the catalog. All reconciliation happens in the
//! library.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reel_common::config::{RootFolderInitializer, RootFolderResolver, TomlConfig};
use reel_sync::{
    Catalog, ImportOrchestrator, JsonPolicy, LocalStore, Normalizer, RawRow, SqliteKvBackend,
    Strategy,
};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "reel-sync", version, about = "Reel catalog reconciliation")]
struct Args {
    /// Folder holding the local database
    #[arg(short, long, env = "REEL_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import rows from a JSON file (an array of objects)
    Import {
        file: PathBuf,

        /// append, update, overwrite or backfill
        #[arg(short, long)]
        strategy: Option<Strategy>,

        /// Print the analysis without changing anything
        #[arg(long)]
        dry_run: bool,

        /// Reject rows with malformed embedded JSON instead of defaulting
        #[arg(long)]
        strict: bool,
    },
    /// List live records
    List,
    /// Rebuild relationship lists and save
    Reconcile,
    /// Soft-delete a record
    Delete { id: Uuid },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (toml_config, config_problem) = TomlConfig::load_or_default();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml_config.log_level().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Deferred until the subscriber is installed
    if let Some(problem) = config_problem {
        warn!("{}", problem);
    }

    let root_folder = RootFolderResolver::new(args.root_folder.clone(), toml_config.clone()).resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;

    let db_path = initializer.database_path(&toml_config);
    info!("Database: {}", db_path.display());
    let pool = reel_common::db::init_database(&db_path).await?;

    let mut catalog = Catalog::open(LocalStore::new(SqliteKvBackend::new(pool))).await;
    for warning in catalog.warnings() {
        warn!("{}", warning);
        eprintln!("warning: {}", warning);
    }

    match args.command {
        Command::Import {
            file,
            strategy,
            dry_run,
            strict,
        } => {
            let strategy = match strategy {
                Some(strategy) => strategy,
                None => configured_strategy(&toml_config),
            };
            if strict {
                catalog = catalog.with_orchestrator(ImportOrchestrator::new(Normalizer::new(
                    JsonPolicy::Strict,
                )));
            }

            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let rows: Vec<RawRow> = serde_json::from_str(&content)
                .with_context(|| format!("{} is not a JSON array of rows", file.display()))?;
            let source = file.display().to_string();

            let analysis = catalog.analyze(&source, &rows);
            println!("{}", serde_json::to_string_pretty(&analysis.summary)?);
            if dry_run {
                return Ok(());
            }

            let report = catalog.commit(&analysis, strategy).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::List => {
            for record in catalog.records() {
                println!(
                    "{}  {} ({})  [{}]  related: {}",
                    record.id,
                    record.name,
                    record.year,
                    record.status,
                    record.related_entries.len()
                );
            }
        }
        Command::Reconcile => {
            catalog.reconcile().await?;
            println!("Reconciled {} records", catalog.records().count());
        }
        Command::Delete { id } => {
            if catalog.soft_delete(&id).await? {
                println!("Deleted {}", id);
            } else {
                println!("No record with id {}", id);
            }
        }
    }

    Ok(())
}

fn configured_strategy(config: &TomlConfig) -> Strategy {
    match config.default_strategy.as_deref().map(str::parse::<Strategy>) {
        Some(Ok(strategy)) => strategy,
        Some(Err(e)) => {
            warn!("{}, using {}", e, Strategy::default());
            Strategy::default()
        }
        None => Strategy::default(),
    }
}
