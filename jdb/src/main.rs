//! jdb - command-line access to jsondb collections

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use jsondb::cli::{Cli, Command, filters_to_pattern};
use jsondb::{Config, Database, Query};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install subscriber: {}", e))?;

    debug!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn not_found(collection: &str, id: &str) -> ! {
    eprintln!("{} No record {} in {}", "✗".red(), id.yellow(), collection.cyan());
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(base_dir) = cli.base_dir {
        config.base_dir = base_dir;
    }

    setup_logging(cli.log_level.as_deref(), config.log_level.as_deref()).context("Failed to setup logging")?;
    info!(base_dir = %config.base_dir.display(), "jdb starting");

    let db = Database::open(&config);

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::List => {
            let names = db.collections().await?;
            if names.is_empty() {
                println!("No collections found");
            } else {
                for name in names {
                    println!("{}", name);
                }
            }
        }
        Command::All { collection } => {
            let records = db.documents(&collection)?.all().await?;
            print_json(&records)?;
        }
        Command::Find { collection, filters } => {
            let query = Query::pattern(filters_to_pattern(filters));
            let records = db.documents(&collection)?.find(query).await?;
            print_json(&records)?;
        }
        Command::Get { collection, id } => match db.documents(&collection)?.find_by_id(&id).await? {
            Some(record) => print_json(&record)?,
            None => not_found(&collection, &id),
        },
        Command::Add { collection, fields } => {
            let record = db.documents(&collection)?.add(fields).await?;
            eprintln!("{} Added {} to {}", "✓".green(), record.id.cyan(), collection);
            print_json(&record)?;
        }
        Command::Update { collection, id, patch } => {
            match db.documents(&collection)?.update_by_id(&id, &patch).await? {
                Some(record) => {
                    eprintln!("{} Updated {} in {}", "✓".green(), record.id.cyan(), collection);
                    print_json(&record)?;
                }
                None => not_found(&collection, &id),
            }
        }
        Command::Delete { collection, id } => {
            if db.documents(&collection)?.delete_by_id(&id).await? {
                println!("{} Deleted {} from {}", "✓".green(), id.cyan(), collection);
            } else {
                not_found(&collection, &id);
            }
        }
        Command::Count { collection, filters } => {
            let query = if filters.is_empty() {
                Query::All
            } else {
                Query::pattern(filters_to_pattern(filters))
            };
            let count = db.documents(&collection)?.count(query).await?;
            println!("{}", count);
        }
        Command::Clear { collection, yes } => {
            if !yes {
                eyre::bail!("Refusing to clear {} without --yes", collection);
            }
            db.documents(&collection)?.clear().await?;
            println!("{} Cleared {}", "✓".green(), collection);
        }
        Command::Drop { collection, yes } => {
            if !yes {
                eyre::bail!("Refusing to drop {} without --yes", collection);
            }
            if db.drop_collection(&collection).await? {
                println!("{} Dropped {}", "✓".green(), collection);
            } else {
                println!("Collection {} does not exist", collection.yellow());
            }
        }
    }

    db.shutdown().await;
    Ok(())
}
