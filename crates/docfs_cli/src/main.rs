//! DocFS CLI
//!
//! Command-line tools for DocFS data directories.
//!
//! # Commands
//!
//! - `inspect` - Display document counts per entity set and journal size
//! - `repair` - Resolve staging markers left by interrupted writes
//! - `compact` - Compact flat entity set files
//! - `dump-journal` - Dump journal records for debugging
//! - `find` - Run a query against one entity set

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// DocFS command-line maintenance tools.
#[derive(Parser)]
#[command(name = "docfs")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Path to a JSON document model (inferred from the directory if omitted)
    #[arg(global = true, short, long)]
    model: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display document counts per entity set and journal size
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Resolve staging markers left by interrupted writes
    Repair,

    /// Compact flat entity set files
    Compact,

    /// Dump journal records for debugging
    DumpJournal {
        /// Maximum number of records to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a query against one entity set
    Find {
        /// Entity set to query
        entity_set: String,

        /// JSON query, e.g. '{"name": {"$regex": "^inv"}}'
        #[arg(short, long, default_value = "{}")]
        query: String,

        /// Maximum number of documents to print
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let model = cli.model.as_deref();
    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Data directory required for inspect")?;
            commands::inspect::run(&path, model, &format).await?;
        }
        Commands::Repair => {
            let path = cli.path.ok_or("Data directory required for repair")?;
            commands::repair::run(&path).await?;
        }
        Commands::Compact => {
            let path = cli.path.ok_or("Data directory required for compact")?;
            commands::compact::run(&path, model).await?;
        }
        Commands::DumpJournal { limit, format } => {
            let path = cli.path.ok_or("Data directory required for dump-journal")?;
            commands::dump_journal::run(&path, limit, &format).await?;
        }
        Commands::Find {
            entity_set,
            query,
            limit,
        } => {
            let path = cli.path.ok_or("Data directory required for find")?;
            commands::find::run(&path, model, &entity_set, &query, limit).await?;
        }
        Commands::Version => {
            println!("DocFS CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("DocFS Core v{}", docfs_core::VERSION);
        }
    }

    Ok(())
}
