//! Subcommand implementations and shared helpers.

pub mod cache;
pub mod get;
pub mod warm;

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tilecache::config::CacheSettings;
use tilecache::log::TracingLogger;
use tilecache::TileCache;

use crate::error::CliError;

/// Load settings from `config` (or the default path) and apply overrides.
pub fn load_settings(
    config: Option<&Path>,
    cache_dir: Option<PathBuf>,
) -> Result<CacheSettings, CliError> {
    let mut settings = match config {
        Some(path) => CacheSettings::load_from(path)?,
        None => CacheSettings::load()?,
    };
    if let Some(dir) = cache_dir {
        settings.directory = dir;
    }
    Ok(settings)
}

/// Open the on-disk cache described by `settings`.
///
/// The CLI always works on the disk tier, so persistence is forced on.
pub fn open_cache(settings: &CacheSettings) -> Result<TileCache, CliError> {
    let config = settings.to_cache_config()?.with_persistent(true);
    let cache = TileCache::open(config, &settings.directory, Arc::new(TracingLogger::new()))?;
    Ok(cache)
}

/// Parse `A..B` (inclusive) or a single `A` into a tile coordinate range.
pub fn parse_range(value: &str) -> Result<RangeInclusive<u32>, String> {
    let parse = |s: &str| {
        s.trim()
            .parse::<u32>()
            .map_err(|_| format!("'{}' is not a tile coordinate", s.trim()))
    };

    let (start, end) = match value.split_once("..") {
        Some((start, end)) => (parse(start)?, parse(end.trim_start_matches('='))?),
        None => {
            let single = parse(value)?;
            (single, single)
        }
    };

    if start > end {
        return Err(format!("range {}..{} is empty", start, end));
    }
    Ok(start..=end)
}
