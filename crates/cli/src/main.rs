mod commands;

use std::path::PathBuf;

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use strata_core::{init_logging, StrataConfig};
use strata_migrate::Direction;

use commands::*;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Ordered, reversible PostgreSQL migrations with a generated model mirror")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./strata.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default strata.yaml
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Create a create-table migration
    Create {
        /// Table name
        table: String,

        /// Columns as name:type, e.g. name:varchar(255) age:integer email:text!
        columns: Vec<String>,
    },

    /// Create an alter-table migration
    Alter {
        /// Table name
        table: String,

        /// Operations, e.g. add age:integer drop legacy rename name:full_name
        #[arg(required = true)]
        operations: Vec<String>,
    },

    /// Apply every pending migration as one batch
    Up,

    /// Roll back the most recent batch
    Down,

    /// Apply or revert a single migration
    Run {
        /// Migration name, e.g. m_2025010112000000_create_users
        name: String,

        /// up or down
        direction: Direction,
    },

    /// Show applied and pending migrations
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Regenerate the model mirror from the migration files
    Sync,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Init { force } = cli.command {
        return init::run(cli.config.as_deref(), force);
    }

    let config = StrataConfig::load(cli.config.as_deref())?;
    init_logging(&config.logging).map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    match cli.command {
        Commands::Init { .. } => unreachable!("handled before configuration is loaded"),
        Commands::Create { table, columns } => {
            generate::create(&config, &table, &columns)?;
        }
        Commands::Alter { table, operations } => {
            generate::alter(&config, &table, &operations)?;
        }
        Commands::Up => {
            migrate::up(&config).await?;
        }
        Commands::Down => {
            migrate::down(&config).await?;
        }
        Commands::Run { name, direction } => {
            migrate::run(&config, &name, direction).await?;
        }
        Commands::Status { json } => {
            migrate::status(&config, json).await?;
        }
        Commands::Sync => {
            sync::run(&config)?;
        }
    }

    Ok(())
}
