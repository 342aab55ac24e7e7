//! Render missing tiles into the cache.

use std::io::Write;
use std::ops::RangeInclusive;

use clap::Args;
use tilecache::config::CacheSettings;
use tilecache::key::TileKey;
use tilecache::render::SolidTileRenderer;
use tracing::info;

use super::{open_cache, parse_range};
use crate::error::CliError;

/// Arguments of `tilecache warm`.
#[derive(Debug, Args)]
pub struct WarmArgs {
    /// Cache identifier (render theme) to warm
    #[arg(long)]
    pub cache_id: String,

    /// Zoom level
    #[arg(long)]
    pub zoom: u8,

    /// Tile columns, e.g. 100..120
    #[arg(long, value_parser = parse_range)]
    pub x: RangeInclusive<u32>,

    /// Tile rows, e.g. 40..60
    #[arg(long, value_parser = parse_range)]
    pub y: RangeInclusive<u32>,
}

/// Tiles rendered and already present during one warm run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct WarmSummary {
    pub rendered: u64,
    pub cached: u64,
}

/// Render every tile of the range that is not cached yet.
pub fn run(
    settings: &CacheSettings,
    args: &WarmArgs,
    out: &mut dyn Write,
) -> Result<WarmSummary, CliError> {
    let cache = open_cache(settings)?;
    let renderer = SolidTileRenderer::new(settings.tile_size);
    let mut summary = WarmSummary::default();

    for x in args.x.clone() {
        for y in args.y.clone() {
            let key = TileKey::new(args.cache_id.as_str(), args.zoom, x, y);
            if cache.contains_key(&key) {
                summary.cached += 1;
                continue;
            }
            cache.get_or_render(&key, &renderer)?;
            summary.rendered += 1;
        }
    }
    cache.flush()?;

    let stats = cache.stats();
    info!(
        cache_id = %args.cache_id,
        rendered = summary.rendered,
        cached = summary.cached,
        "Warm complete"
    );
    cache.destroy();

    writeln!(
        out,
        "Warmed '{}' at zoom {}: {} rendered, {} already cached ({} writes, {} failed, {} dropped)",
        args.cache_id,
        args.zoom,
        summary.rendered,
        summary.cached,
        stats.writes_completed,
        stats.write_failures,
        stats.queue_overflows
    )
    .map_err(|error| CliError::FileWrite {
        path: "<stdout>".to_string(),
        error,
    })?;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tilecache::cache::FileSystemTier;

    fn settings_for(dir: &TempDir) -> CacheSettings {
        CacheSettings {
            directory: dir.path().to_path_buf(),
            tile_size: 8,
            ..CacheSettings::default()
        }
    }

    fn args(x: RangeInclusive<u32>, y: RangeInclusive<u32>) -> WarmArgs {
        WarmArgs {
            cache_id: "warm".to_string(),
            zoom: 6,
            x,
            y,
        }
    }

    #[test]
    fn test_warm_renders_then_reuses() {
        let dir = TempDir::new().unwrap();
        let settings = settings_for(&dir);

        let first = run(&settings, &args(0..=2, 0..=1), &mut Vec::new()).unwrap();
        assert_eq!(
            first,
            WarmSummary {
                rendered: 6,
                cached: 0
            }
        );

        let second = run(&settings, &args(0..=3, 0..=1), &mut Vec::new()).unwrap();
        assert_eq!(
            second,
            WarmSummary {
                rendered: 2,
                cached: 6
            }
        );

        let usage = FileSystemTier::open(dir.path()).unwrap().disk_usage().unwrap();
        assert_eq!(usage["warm"].files, 8);
    }

    #[test]
    fn test_warm_output_line() {
        let dir = TempDir::new().unwrap();
        let mut out = Vec::new();

        run(&settings_for(&dir), &args(1..=1, 1..=1), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("1 rendered"));
        assert!(text.contains("1 writes"));
    }
}
