//! Two-tier tile cache.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        TileCache                          │
//! │  get / put / purge / flush / destroy                      │
//! └──────┬──────────────────────┬──────────────────────┬──────┘
//!        │                      │                      │
//!        ▼                      ▼                      ▼
//! ┌──────────────┐     ┌─────────────────┐    ┌─────────────────┐
//! │  MemoryTier  │     │ WriteBehindWorker│──►│ dyn TileTier    │
//! │  strict LRU  │     │ bounded FIFO     │   │ (FileSystemTier)│
//! └──────────────┘     └─────────────────┘    └─────────────────┘
//! ```
//!
//! The memory tier is bounded by bytes or entries and evicts the least
//! recently used tile synchronously on insert. The persistent tier is any
//! [`TileTier`]; the default is [`FileSystemTier`]. Persistent writes happen
//! on the caller's thread or on a single background worker fed by a bounded
//! queue, and [`OverflowPolicy`](crate::config::OverflowPolicy) decides what
//! happens when that queue is full.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tilecache::cache::TileCache;
//! use tilecache::config::{CacheConfig, Capacity};
//! use tilecache::key::{TileImage, TileKey};
//! use tilecache::log::NoOpLogger;
//!
//! let dir = std::env::temp_dir().join("tilecache-doc-example");
//! let cache = TileCache::open(
//!     CacheConfig::new(Capacity::Entries(64)),
//!     &dir,
//!     Arc::new(NoOpLogger),
//! )
//! .unwrap();
//!
//! let key = TileKey::new("osm", 12, 2200, 1343);
//! cache.put(key.clone(), TileImage::new(vec![0u8; 32])).unwrap();
//! assert!(cache.get(&key).is_some());
//!
//! cache.purge("osm").unwrap();
//! cache.destroy();
//! ```

mod disk;
mod error;
mod memory;
mod stats;
mod traits;
mod two_level;
mod worker;

pub use disk::{decode_cache_id, encode_cache_id, DiskUsage, FileSystemTier, TILE_EXTENSION};
pub use error::TileCacheError;
pub use memory::{CacheEntry, InsertOutcome, MemoryTier};
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use traits::{PurgeResult, StorageError, TileTier};
pub use two_level::TileCache;
pub use worker::{PendingWrites, WriteBehindWorker};
