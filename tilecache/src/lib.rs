//! tilecache - two-tier map tile cache
//!
//! Keeps rendered map tiles in a bounded, strictly LRU memory tier in front
//! of a persistent blob store, with an optional single-threaded write-behind
//! queue between the two.
//!
//! - [`key`]: tile identity and payload
//! - [`cache`]: memory and persistent tiers, the write-behind worker and
//!   [`TileCache`](cache::TileCache)
//! - [`config`]: constructor input, preference surface and INI file
//! - [`render`]: renderer collaborator used on misses
//! - [`log`]: injected failure reporting
//! - [`logging`]: `tracing` subscriber setup for binaries

pub mod cache;
pub mod config;
pub mod key;
pub mod log;
pub mod logging;
pub mod render;

pub use cache::{TileCache, TileCacheError, TileTier};
pub use config::{CacheConfig, CacheSettings, Capacity, OverflowPolicy};
pub use key::{TileImage, TileKey};
