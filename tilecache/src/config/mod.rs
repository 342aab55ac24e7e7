//! Cache configuration.
//!
//! - [`CacheConfig`]: validated constructor input for [`TileCache`](crate::cache::TileCache)
//! - [`CacheSettings`]: preference surface with display geometry, from which
//!   the memory capacity is derived
//! - INI load/save of [`CacheSettings`] at [`config_file_path`]
//!
//! # Example
//!
//! ```ini
//! [cache]
//! directory = ~/.cache/tilecache
//! threaded = true
//! queue_size = 4
//! persistent = true
//! overflow = block
//!
//! [display]
//! tile_size = 256
//! overdraw_factor = 1.2
//! screen_ratio = 1.0
//! width = 1920
//! height = 1080
//! ```

mod cache;
mod file;
mod settings;

pub use cache::{
    CacheConfig, Capacity, OverflowPolicy, DEFAULT_CAPACITY_ENTRIES, DEFAULT_QUEUE_DEPTH,
};
pub use file::{config_directory, config_file_path, expand_tilde, ConfigError};
pub use settings::{
    default_cache_directory, CacheSettings, DEFAULT_OVERDRAW_FACTOR, DEFAULT_SCREEN_HEIGHT,
    DEFAULT_SCREEN_RATIO, DEFAULT_SCREEN_WIDTH, DEFAULT_TILE_SIZE, MIN_CACHE_ENTRIES,
};
