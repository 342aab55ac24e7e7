//! Errors surfaced by the two-level tile cache.

use thiserror::Error;

use super::traits::StorageError;
use crate::render::RenderError;

/// Errors that can occur during tile cache operations.
///
/// Storage failures are normally recovered inside the cache (the operation
/// degrades to memory-only behaviour and the failure is reported through the
/// injected logger). They appear here for tier-level callers and for
/// operations such as `flush` that have nothing to degrade to.
#[derive(Debug, Error)]
pub enum TileCacheError {
    /// Reading from the persistent tier failed.
    #[error("Persistent storage read failed for {key}: {source}")]
    StorageRead {
        key: String,
        #[source]
        source: StorageError,
    },

    /// Writing to the persistent tier failed.
    #[error("Persistent storage write failed for {key}: {source}")]
    StorageWrite {
        key: String,
        #[source]
        source: StorageError,
    },

    /// The write-behind queue was full and the persistent write was dropped.
    #[error("Write queue full ({depth} pending), persistent write dropped")]
    QueueOverflow { depth: usize },

    /// The configuration was rejected at construction time.
    #[error("Invalid cache configuration: {0}")]
    InvalidConfiguration(String),

    /// The cache has been destroyed.
    #[error("Tile cache is shut down")]
    ShuttingDown,

    /// The renderer failed on a cache miss.
    #[error("Tile render failed: {0}")]
    Render(#[from] RenderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_overflow_display() {
        let err = TileCacheError::QueueOverflow { depth: 4 };
        assert!(err.to_string().contains("4 pending"));
    }

    #[test]
    fn test_storage_read_has_source() {
        use std::error::Error;

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = TileCacheError::StorageRead {
            key: "osm/1/0/0".to_string(),
            source: StorageError::Io(io),
        };
        assert!(err.to_string().contains("osm/1/0/0"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_render_error_converts() {
        let err: TileCacheError = RenderError::Failed("no theme".to_string()).into();
        assert!(matches!(err, TileCacheError::Render(_)));
        assert!(err.to_string().contains("no theme"));
    }

    #[test]
    fn test_invalid_configuration_display() {
        let err = TileCacheError::InvalidConfiguration("queue_depth must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid cache configuration: queue_depth must be > 0"
        );
    }
}
