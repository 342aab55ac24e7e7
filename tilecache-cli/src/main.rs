//! tilecache CLI - inspect, warm and maintain an on-disk tile cache.

mod commands;
mod error;

use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tilecache::logging::init_logging;

use commands::get::GetArgs;
use commands::warm::WarmArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "tilecache")]
#[command(version, about = "Two-tier map tile cache", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/tilecache/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Cache directory, overriding the config file
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show per-identifier file and byte counts of the disk cache
    Stats {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Render missing tiles of a range into the cache
    Warm(WarmArgs),
    /// Copy one cached tile to a file
    Get(GetArgs),
    /// Remove every tile of one cache identifier
    Purge {
        /// Cache identifier to remove
        cache_id: String,
    },
    /// Remove every cached tile
    Clear,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    init_logging(cli.verbose).map_err(|e| CliError::LoggingInit(e.to_string()))?;

    let settings = commands::load_settings(cli.config.as_deref(), cli.cache_dir)?;
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Stats { json } => commands::cache::stats(&settings, json, &mut stdout),
        Commands::Warm(args) => commands::warm::run(&settings, &args, &mut stdout).map(|_| ()),
        Commands::Get(args) => commands::get::run(&settings, &args, &mut stdout),
        Commands::Purge { cache_id } => commands::cache::purge(&settings, &cache_id, &mut stdout),
        Commands::Clear => commands::cache::clear(&settings, &mut stdout),
    }
}
