//! FileCan CLI - local administration of a FileCan data directory

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Parser)]
#[command(name = "filecan", version, about = "Inspect and edit a FileCan data directory")]
pub struct Cli {
    /// Data directory
    #[arg(long, env = "FILECAN_DATA_DIR", default_value = "data")]
    pub data_dir: PathBuf,

    /// Log filter (e.g. `info`, `filecan_core=debug`)
    #[arg(long, env = "FILECAN_LOG", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List areas
    Areas,
    /// List collections of an area
    Collections { area: String },
    /// Count collections of an area, or objects of a collection
    Count {
        area: String,
        collection: Option<String>,
    },
    /// List object ids
    List {
        area: String,
        collection: String,
        #[arg(long, default_value_t = 0)]
        skip: i64,
        #[arg(long, default_value_t = filecan_core::config::DEFAULT_PAGE_SIZE)]
        take: i64,
    },
    /// Find object ids carrying all keywords of the query
    Find {
        area: String,
        collection: String,
        query: String,
        #[arg(long, default_value_t = 0)]
        skip: i64,
        #[arg(long, default_value_t = filecan_core::config::DEFAULT_PAGE_SIZE)]
        take: i64,
    },
    /// Print an object as JSON
    Get {
        area: String,
        collection: String,
        id: String,
        #[arg(long, default_value = "")]
        password: String,
    },
    /// Print object metadata
    Info {
        area: String,
        collection: String,
        id: String,
    },
    /// Insert a JSON document and print its id
    Put {
        area: String,
        collection: String,
        json: String,
        #[arg(long, default_value = "")]
        id: String,
        #[arg(long, default_value = "")]
        password: String,
        #[arg(long = "keyword")]
        keywords: Vec<String>,
    },
    /// Replace a stored JSON document
    Update {
        area: String,
        collection: String,
        id: String,
        json: String,
        #[arg(long, default_value = "")]
        password: String,
        #[arg(long = "keyword")]
        keywords: Vec<String>,
    },
    /// Delete an object
    Delete {
        area: String,
        collection: String,
        id: String,
    },
    /// Delete a collection and everything in it
    DropCollection { area: String, collection: String },
    /// Delete an area and everything in it
    DropDatabase { area: String },
    /// Rebuild a collection's keyword index
    Reindex { area: String, collection: String },
    /// Print a freshly generated object id
    NewId,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(&cli.log_level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let stdout = std::io::stdout();
    commands::run(cli, &mut stdout.lock())
}
