//! Constructor input for [`TileCache`](crate::cache::TileCache).

use std::fmt;
use std::str::FromStr;

use crate::cache::TileCacheError;

/// Default write-behind queue depth.
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

/// Default memory capacity in entries when nothing else is derived.
pub const DEFAULT_CAPACITY_ENTRIES: usize = 64;

/// Upper bound of the memory tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// Total encoded image bytes.
    Bytes(u64),
    /// Number of tiles.
    Entries(usize),
}

impl Capacity {
    fn is_zero(&self) -> bool {
        match *self {
            Capacity::Bytes(n) => n == 0,
            Capacity::Entries(n) => n == 0,
        }
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capacity::Bytes(n) => write!(f, "{} bytes", n),
            Capacity::Entries(n) => write!(f, "{} entries", n),
        }
    }
}

/// What `put` does when the write-behind queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Wait for the worker to free a slot.
    #[default]
    Block,
    /// Skip the persistent write and report it.
    Drop,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::Block => "block",
            OverflowPolicy::Drop => "drop",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "block" => Ok(OverflowPolicy::Block),
            "drop" => Ok(OverflowPolicy::Drop),
            other => Err(format!(
                "unknown overflow policy '{}', expected 'block' or 'drop'",
                other
            )),
        }
    }
}

/// Configuration of one two-level tile cache.
///
/// Validated once by the cache constructor and immutable afterwards.
///
/// # Example
///
/// ```
/// use tilecache::config::{CacheConfig, Capacity, OverflowPolicy};
///
/// let config = CacheConfig::new(Capacity::Entries(128))
///     .with_queue_depth(8)
///     .with_overflow_policy(OverflowPolicy::Drop);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub capacity: Capacity,
    /// Whether tiles are also written to a persistent tier.
    pub persistent: bool,
    /// Whether persistent writes go through the background worker.
    pub threaded: bool,
    /// Bound of the write-behind queue.
    pub queue_depth: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: Capacity::Entries(DEFAULT_CAPACITY_ENTRIES),
            persistent: true,
            threaded: true,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            overflow_policy: OverflowPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Persistent, threaded configuration with the given memory capacity.
    pub fn new(capacity: Capacity) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Memory-only configuration.
    pub fn memory_only(capacity: Capacity) -> Self {
        Self {
            capacity,
            persistent: false,
            ..Self::default()
        }
    }

    pub fn with_persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn with_threaded(mut self, threaded: bool) -> Self {
        self.threaded = threaded;
        self
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    /// Check the values that do not depend on the injected tiers.
    pub fn validate(&self) -> Result<(), TileCacheError> {
        if self.capacity.is_zero() {
            return Err(TileCacheError::InvalidConfiguration(
                "capacity must be greater than 0".to_string(),
            ));
        }
        if self.queue_depth == 0 {
            return Err(TileCacheError::InvalidConfiguration(
                "queue depth must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
