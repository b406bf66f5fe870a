//! TenantDB CLI
//!
//! Command-line tools for TenantDB databases stored as blob files.
//!
//! # Commands
//!
//! - `serve` - Serve a database over TCP, persisting after each connection
//! - `inspect` - Display databases, entity counts and ownership classes
//! - `query` - Run a query and print matching entities as JSON lines

mod commands;

use clap::{ArgAction, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// TenantDB command-line tools.
#[derive(Parser)]
#[command(name = "tenantdb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the database blobs
    #[arg(global = true, short, long)]
    data_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a database over TCP
    Serve {
        /// Database name
        #[arg(short = 'n', long, default_value = "main")]
        database: String,

        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:7130")]
        bind: SocketAddr,

        /// Items per cursor batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Display databases, entity counts and ownership classes
    Inspect {
        /// Only inspect this database
        #[arg(short = 'n', long)]
        database: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a query and print matching entities as JSON lines
    Query {
        /// Database name
        #[arg(short = 'n', long, default_value = "main")]
        database: String,

        /// Entity type to match
        #[arg(short = 't', long = "type")]
        entity_type: String,

        /// Required owner (repeatable)
        #[arg(short, long = "owner", action = ArgAction::Append)]
        owners: Vec<String>,

        /// Require exactly the given owners
        #[arg(long)]
        exact: bool,

        /// Where clause: PATH OP JSON (repeatable)
        #[arg(
            short,
            long = "where",
            num_args = 3,
            value_names = ["PATH", "OP", "VALUE"],
            action = ArgAction::Append
        )]
        where_args: Vec<String>,

        /// Skip this many results
        #[arg(long)]
        skip: Option<usize>,

        /// Return at most this many results
        #[arg(long)]
        take: Option<usize>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve {
            database,
            bind,
            batch_size,
        } => {
            let data_dir = cli.data_dir.ok_or("Data directory required for serve")?;
            commands::serve::run(&data_dir, &database, bind, batch_size)?;
        }
        Commands::Inspect { database, format } => {
            let data_dir = cli.data_dir.ok_or("Data directory required for inspect")?;
            let format = format.parse()?;
            commands::inspect::run(&data_dir, database.as_deref(), format)?;
        }
        Commands::Query {
            database,
            entity_type,
            owners,
            exact,
            where_args,
            skip,
            take,
        } => {
            let data_dir = cli.data_dir.ok_or("Data directory required for query")?;
            let query = commands::query::build_query(
                &entity_type,
                &owners,
                exact,
                &where_args,
                skip,
                take,
            )?;
            commands::query::run(&data_dir, &database, &query)?;
        }
        Commands::Version => {
            println!("TenantDB CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
