//! TideSync CLI
//!
//! Command-line tools for running syncs against a file store.
//!
//! # Commands
//!
//! - `apply` - Apply a bundle file to the store
//! - `pull` - Pull records from a directory of per-entity files
//! - `inspect` - Show record counts and watermarks per entity

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// TideSync command-line tools.
#[derive(Parser)]
#[command(name = "tidesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a bundle of records (`{"entity": [records...]}`) to the store
    Apply {
        /// Registry manifest (JSON)
        #[arg(short, long)]
        registry: PathBuf,

        /// Bundle file
        #[arg(short = 'b', long)]
        payload: PathBuf,

        /// Bundle encoding (json, cbor)
        #[arg(long, default_value = "json")]
        encoding: String,

        /// Run every entity on the calling thread
        #[arg(long)]
        serial: bool,

        /// Report format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Pull records from `<source>/<entity>.json` (or `.cbor`) files
    Pull {
        /// Registry manifest (JSON)
        #[arg(short, long)]
        registry: PathBuf,

        /// Directory holding one record array per entity
        #[arg(short, long)]
        source: PathBuf,

        /// File encoding (json, cbor)
        #[arg(long, default_value = "json")]
        encoding: String,

        /// Run every entity on the calling thread
        #[arg(long)]
        serial: bool,

        /// Report format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show record counts and watermarks per entity
    Inspect {
        /// Registry manifest (JSON)
        #[arg(short, long)]
        registry: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
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
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Apply {
            registry,
            payload,
            encoding,
            serial,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for apply")?;
            commands::apply::run(&path, &registry, &payload, &encoding, serial, &format)?;
        }
        Commands::Pull {
            registry,
            source,
            encoding,
            serial,
            format,
        } => {
            let path = cli.path.ok_or("Store path required for pull")?;
            commands::pull::run(&path, &registry, &source, &encoding, serial, &format)?;
        }
        Commands::Inspect { registry, format } => {
            let path = cli.path.ok_or("Store path required for inspect")?;
            commands::inspect::run(&path, &registry, &format)?;
        }
        Commands::Version => {
            println!("TideSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
