//! Cache statistics tracking and reporting.
//!
//! Counters are lock-free atomics shared between caller threads and the
//! write-behind worker. [`CacheStats::snapshot`] takes a point-in-time copy
//! for display or JSON output.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Live counters for one tile cache.
#[derive(Debug)]
pub struct CacheStats {
    memory_hits: AtomicU64,
    pending_hits: AtomicU64,
    persistent_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    queue_overflows: AtomicU64,
    read_failures: AtomicU64,
    write_failures: AtomicU64,
    writes_completed: AtomicU64,
    created_at: Instant,
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStats {
    /// Create a new statistics tracker.
    pub fn new() -> Self {
        Self {
            memory_hits: AtomicU64::new(0),
            pending_hits: AtomicU64::new(0),
            persistent_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            queue_overflows: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            writes_completed: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    pub fn record_memory_hit(&self) {
        self.memory_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a hit served from a write that was still queued.
    pub fn record_pending_hit(&self) {
        self.pending_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persistent_hit(&self) {
        self.persistent_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_queue_overflow(&self) {
        self.queue_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_failure(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_write(&self) {
        self.writes_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of the counters.
    ///
    /// # Arguments
    ///
    /// * `resident_entries` - Current memory tier entry count
    /// * `resident_bytes` - Current memory tier size
    /// * `queued_writes` - Writes waiting in the worker queue
    pub fn snapshot(
        &self,
        resident_entries: usize,
        resident_bytes: u64,
        queued_writes: usize,
    ) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            pending_hits: self.pending_hits.load(Ordering::Relaxed),
            persistent_hits: self.persistent_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            queue_overflows: self.queue_overflows.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            writes_completed: self.writes_completed.load(Ordering::Relaxed),
            resident_entries,
            resident_bytes,
            queued_writes,
            uptime_secs: self.created_at.elapsed().as_secs(),
        }
    }
}

/// Point-in-time copy of cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStatsSnapshot {
    pub memory_hits: u64,
    pub pending_hits: u64,
    pub persistent_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub queue_overflows: u64,
    pub read_failures: u64,
    pub write_failures: u64,
    pub writes_completed: u64,
    pub resident_entries: usize,
    pub resident_bytes: u64,
    pub queued_writes: usize,
    pub uptime_secs: u64,
}

impl CacheStatsSnapshot {
    /// Total lookups that returned a tile.
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.pending_hits + self.persistent_hits
    }

    /// Overall hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    /// Memory-tier hit rate (0.0 to 1.0).
    pub fn memory_hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.memory_hits as f64 / total as f64
        }
    }
}
