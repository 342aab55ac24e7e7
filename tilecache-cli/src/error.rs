//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use tilecache::cache::StorageError;
use tilecache::config::ConfigError;
use tilecache::TileCacheError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file error
    Config(ConfigError),
    /// Cache construction or operation failed
    Cache(TileCacheError),
    /// Direct access to the disk tier failed
    Storage(StorageError),
    /// Requested tile is not cached
    TileNotFound(String),
    /// Failed to write output file
    FileWrite { path: String, error: std::io::Error },
    /// Failed to serialize output
    Json(serde_json::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config(_) => {
                eprintln!();
                eprintln!("Check the [cache] and [display] sections of your config.ini,");
                eprintln!("or pass another file with --config.");
            }
            CliError::TileNotFound(_) => {
                eprintln!();
                eprintln!("Render it first with: tilecache warm --cache-id <ID> ...");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Cache(e) => write!(f, "Cache error: {}", e),
            CliError::Storage(e) => write!(f, "Disk cache error: {}", e),
            CliError::TileNotFound(key) => write!(f, "Tile {} is not cached", key),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path, error)
            }
            CliError::Json(e) => write!(f, "Failed to format output: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Cache(e) => Some(e),
            CliError::Storage(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            CliError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<TileCacheError> for CliError {
    fn from(e: TileCacheError) -> Self {
        CliError::Cache(e)
    }
}

impl From<StorageError> for CliError {
    fn from(e: StorageError) -> Self {
        CliError::Storage(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Json(e)
    }
}
