//! Capability interface shared by every cache tier.
//!
//! The two-level [`TileCache`](super::TileCache) composes an in-memory tier
//! with an optional persistent tier. Both implement [`TileTier`], so the
//! persistent side can be swapped for any blob store (filesystem, embedded
//! database, test double) without touching the cache logic.
//!
//! # Thread Safety
//!
//! Tiers are shared between caller threads and the write-behind worker, so
//! all implementations must be `Send + Sync`.

use std::fmt;

use thiserror::Error;

use crate::key::{TileImage, TileKey};

/// Errors raised by a tier implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error in the backing store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The tier panicked while handling the request.
    #[error("Storage call panicked: {0}")]
    Panicked(String),

    /// Backend-specific failure.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Outcome of a purge across both tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeResult {
    /// Entries removed from the memory tier.
    pub memory_entries: usize,
    /// Entries removed from the persistent tier.
    pub persistent_entries: usize,
}

impl fmt::Display for PurgeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "purged {} memory entries, {} persistent entries",
            self.memory_entries, self.persistent_entries
        )
    }
}

/// Key/value blob store for rendered tiles.
pub trait TileTier: Send + Sync {
    /// Retrieve a tile.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(image))` if the tile is stored
    /// - `Ok(None)` if it is not
    /// - `Err(_)` if the backend failed
    fn get(&self, key: &TileKey) -> Result<Option<TileImage>, StorageError>;

    /// Store a tile, replacing any previous image for the key.
    fn put(&self, key: &TileKey, image: &TileImage) -> Result<(), StorageError>;

    /// Delete one tile. Returns `true` if it existed.
    fn delete(&self, key: &TileKey) -> Result<bool, StorageError>;

    /// Check for a tile without reading it.
    fn contains(&self, key: &TileKey) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    /// Remove every tile stored under `cache_id`. Returns the number removed.
    fn purge(&self, cache_id: &str) -> Result<usize, StorageError>;

    /// Remove every tile. Returns the number removed.
    fn purge_all(&self) -> Result<usize, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_purge_result_default() {
        let result = PurgeResult::default();
        assert_eq!(result.memory_entries, 0);
        assert_eq!(result.persistent_entries, 0);
    }

    #[test]
    fn test_purge_result_display() {
        let result = PurgeResult {
            memory_entries: 3,
            persistent_entries: 12,
        };
        let display = result.to_string();
        assert!(display.contains("3 memory"));
        assert!(display.contains("12 persistent"));
    }

    #[test]
    fn test_storage_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StorageError = io_err.into();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[test]
    fn test_tile_tier_is_dyn_compatible() {
        fn assert_dyn(_: Option<&dyn TileTier>) {}
        assert_dyn(None);
    }
}
