mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use db_reset::config::{self, ResetConfig};

#[derive(Parser)]
#[command(name = "db-reset", version, about = "Schema-aware bulk reset for SQLite databases")]
struct Cli {
    /// Config file (defaults to ~/.db-reset/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding config and DB_RESET_DB
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List tables, row counts and foreign keys
    Inspect {
        #[arg(long)]
        json: bool,
    },
    /// Empty every table, then restore and verify the foreign keys
    Full {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        json: bool,
    },
    /// Show the delete plan for a root table
    Plan {
        /// Root table
        #[arg(long)]
        root: String,
        /// Column the root ids match (defaults to the single key column)
        #[arg(long)]
        column: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Delete root rows and every row that depends on them
    Selective {
        #[arg(long)]
        root: String,
        #[arg(long)]
        column: Option<String>,
        /// Root ids, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        ids: Vec<String>,
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        json: bool,
    },
    /// Delete rows of one table where a column equals a value, in batches
    Purge {
        #[arg(long)]
        table: String,
        #[arg(long)]
        column: String,
        #[arg(long)]
        value: String,
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ResetConfig::load_from(path)?,
        None => ResetConfig::load()?,
    };
    if let Some(db) = cli.db {
        config.storage.db_path = db;
    }

    // Log to stderr so stdout stays clean for --json output.
    let filter = EnvFilter::try_new(&config.logging.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(config = %cli.config.unwrap_or_else(config::default_config_path).display(), "config loaded");

    match cli.command {
        Command::Inspect { json } => cli::inspect::inspect(&config, json)?,
        Command::Full { yes, json } => cli::full::full(&config, yes, json)?,
        Command::Plan { root, column, json } => {
            cli::plan::plan(&config, &root, column.as_deref(), json)?
        }
        Command::Selective {
            root,
            column,
            ids,
            yes,
            json,
        } => cli::selective::selective(&config, &root, column.as_deref(), &ids, yes, json)?,
        Command::Purge {
            table,
            column,
            value,
            yes,
            json,
        } => cli::purge::purge(&config, &table, &column, &value, yes, json)?,
    }

    Ok(())
}
