//! Copy one cached tile to a file.

use std::io::Write;
use std::path::PathBuf;

use clap::Args;
use tilecache::config::CacheSettings;
use tilecache::key::TileKey;

use super::open_cache;
use crate::error::CliError;

/// Arguments of `tilecache get`.
#[derive(Debug, Args)]
pub struct GetArgs {
    /// Cache identifier (render theme)
    #[arg(long)]
    pub cache_id: String,

    /// Zoom level
    #[arg(long)]
    pub zoom: u8,

    /// Tile column
    #[arg(long)]
    pub x: u32,

    /// Tile row
    #[arg(long)]
    pub y: u32,

    /// Destination file
    #[arg(long, short)]
    pub output: PathBuf,
}

/// Write the tile named by `args` to its output file.
pub fn run(
    settings: &CacheSettings,
    args: &GetArgs,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let key = TileKey::new(args.cache_id.as_str(), args.zoom, args.x, args.y);
    let cache = open_cache(settings)?;
    let image = cache.try_get(&key);
    cache.destroy();

    let image = image?.ok_or_else(|| CliError::TileNotFound(key.to_string()))?;
    std::fs::write(&args.output, image.as_bytes()).map_err(|error| CliError::FileWrite {
        path: args.output.display().to_string(),
        error,
    })?;

    writeln!(
        out,
        "Wrote {} ({} bytes) to {}",
        key,
        image.len(),
        args.output.display()
    )
    .map_err(|error| CliError::FileWrite {
        path: "<stdout>".to_string(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tilecache::cache::{FileSystemTier, TileTier};
    use tilecache::key::TileImage;

    fn get_args(dir: &TempDir, x: u32) -> GetArgs {
        GetArgs {
            cache_id: "osm".to_string(),
            zoom: 9,
            x,
            y: 4,
            output: dir.path().join("out.png"),
        }
    }

    #[test]
    fn test_get_copies_tile() {
        let dir = TempDir::new().unwrap();
        let tiles = dir.path().join("tiles");
        let tier = FileSystemTier::open(&tiles).unwrap();
        let key = TileKey::new("osm", 9, 3, 4);
        tier.put(&key, &TileImage::new(b"png-bytes".to_vec())).unwrap();
        let settings = CacheSettings {
            directory: tiles,
            ..CacheSettings::default()
        };

        let mut out = Vec::new();
        run(&settings, &get_args(&dir, 3), &mut out).unwrap();

        assert_eq!(std::fs::read(dir.path().join("out.png")).unwrap(), b"png-bytes");
        assert!(String::from_utf8(out).unwrap().contains("osm/9/3/4"));
    }

    #[test]
    fn test_get_missing_tile() {
        let dir = TempDir::new().unwrap();
        let settings = CacheSettings {
            directory: dir.path().join("tiles"),
            ..CacheSettings::default()
        };

        let result = run(&settings, &get_args(&dir, 99), &mut Vec::new());

        assert!(matches!(result, Err(CliError::TileNotFound(_))));
        assert!(!dir.path().join("out.png").exists());
    }
}
