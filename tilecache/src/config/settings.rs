//! User-facing cache settings and memory capacity derivation.
//!
//! [`CacheSettings`] is what a map application exposes as preferences:
//! threading, queue size, persistence, and the display geometry the memory
//! tier has to cover. [`CacheSettings::to_cache_config`] turns it into the
//! [`CacheConfig`] the cache constructor takes.

use std::path::PathBuf;

use super::cache::{CacheConfig, Capacity, OverflowPolicy, DEFAULT_QUEUE_DEPTH};
use crate::cache::TileCacheError;

pub const DEFAULT_TILE_SIZE: u32 = 256;
pub const DEFAULT_OVERDRAW_FACTOR: f64 = 1.2;
pub const DEFAULT_SCREEN_RATIO: f64 = 1.0;
pub const DEFAULT_SCREEN_WIDTH: u32 = 1920;
pub const DEFAULT_SCREEN_HEIGHT: u32 = 1080;

/// Smallest memory tier ever derived from display geometry.
pub const MIN_CACHE_ENTRIES: usize = 4;

/// Default on-disk cache location (`~/.cache/tilecache` on Linux).
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tilecache")
}

/// Cache preferences.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Root of the filesystem tier.
    pub directory: PathBuf,
    pub threaded: bool,
    pub queue_size: usize,
    pub persistent: bool,
    pub overflow_policy: OverflowPolicy,
    /// Edge length of a square tile in pixels.
    pub tile_size: u32,
    /// How much larger than the screen the frame buffer is drawn.
    pub overdraw_factor: f64,
    /// Share of the screen this map view occupies.
    pub screen_ratio: f64,
    pub screen_width: u32,
    pub screen_height: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            directory: default_cache_directory(),
            threaded: true,
            queue_size: DEFAULT_QUEUE_DEPTH,
            persistent: true,
            overflow_policy: OverflowPolicy::default(),
            tile_size: DEFAULT_TILE_SIZE,
            overdraw_factor: DEFAULT_OVERDRAW_FACTOR,
            screen_ratio: DEFAULT_SCREEN_RATIO,
            screen_width: DEFAULT_SCREEN_WIDTH,
            screen_height: DEFAULT_SCREEN_HEIGHT,
        }
    }
}

impl CacheSettings {
    /// Number of tiles the memory tier needs to cover one frame buffer.
    ///
    /// The frame buffer is the screen scaled by the overdraw factor. One
    /// spare row and column of tiles is kept on each side, and the result is
    /// scaled by the screen ratio.
    pub fn minimum_cache_size(&self) -> Result<usize, TileCacheError> {
        self.validate()?;

        let buffer_width = (self.screen_width as f64 * self.overdraw_factor) as u64;
        let buffer_height = (self.screen_height as f64 * self.overdraw_factor) as u64;
        let columns = 2 + buffer_width / self.tile_size as u64;
        let rows = 2 + buffer_height / self.tile_size as u64;

        let size = (self.screen_ratio * (rows * columns) as f64) as usize;
        Ok(size.max(MIN_CACHE_ENTRIES))
    }

    /// Build the cache constructor input.
    pub fn to_cache_config(&self) -> Result<CacheConfig, TileCacheError> {
        let entries = self.minimum_cache_size()?;
        let config = CacheConfig::new(Capacity::Entries(entries))
            .with_persistent(self.persistent)
            .with_threaded(self.threaded)
            .with_queue_depth(self.queue_size)
            .with_overflow_policy(self.overflow_policy);
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), TileCacheError> {
        if self.tile_size == 0 {
            return Err(TileCacheError::InvalidConfiguration(
                "tile size must be greater than 0".to_string(),
            ));
        }
        if self.overdraw_factor.is_nan() || self.overdraw_factor <= 0.0 {
            return Err(TileCacheError::InvalidConfiguration(format!(
                "overdraw factor must be positive, got {}",
                self.overdraw_factor
            )));
        }
        if self.screen_ratio.is_nan() || self.screen_ratio <= 0.0 {
            return Err(TileCacheError::InvalidConfiguration(format!(
                "screen ratio must be positive, got {}",
                self.screen_ratio
            )));
        }
        Ok(())
    }
}
