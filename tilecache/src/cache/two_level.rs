//! Two-level tile cache: bounded memory tier in front of a persistent tier.
//!
//! ```text
//!            get                               put
//!             │                                 │
//!             ▼                                 ▼
//!      ┌─────────────┐   miss            ┌─────────────┐
//!      │ MemoryTier  │ ───────┐          │ MemoryTier  │ (evict LRU)
//!      └─────────────┘        │          └─────────────┘
//!                             ▼                 │
//!                   ┌──────────────────┐        │ threaded: queue
//!                   │  PendingWrites   │ ◄──────┤ sync: write now
//!                   └──────────────────┘        ▼
//!                             │ miss     ┌──────────────┐
//!                             └────────► │ TileTier     │
//!                              promote   │ (persistent) │
//!                                        └──────────────┘
//! ```
//!
//! Memory eviction never touches the persistent tier. Persistent failures are
//! reported through the injected [`Logger`] and degrade the affected call to
//! memory-only behaviour.
//!
//! Promotion happens after an unlocked read below memory, so it only inserts
//! when the key is still absent from memory, no `put` of a key sharing its
//! write stripe and no purge or destroy has started since the read began. The
//! checks run under the memory lock.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::disk::FileSystemTier;
use super::error::TileCacheError;
use super::memory::MemoryTier;
use super::stats::{CacheStats, CacheStatsSnapshot};
use super::traits::{PurgeResult, TileTier};
use super::worker::{guarded, PendingWrites, WriteBehindWorker};
use crate::config::{CacheConfig, Capacity};
use crate::key::{TileImage, TileKey};
use crate::log::Logger;
use crate::render::TileRenderer;
use crate::{log_error, log_warn};

/// Buffered notifications per subscriber before it starts lagging.
const NOTIFY_CAPACITY: usize = 64;

/// Number of per-key write counters used to invalidate stale promotions.
const WRITE_STRIPES: usize = 64;

/// State captured at the start of a lookup; promotion is valid only if it
/// is still current.
#[derive(Debug, Clone, Copy)]
struct PromotionTicket {
    purge_epoch: u64,
    stripe: usize,
    writes: u64,
}

/// Bounded in-memory tile cache backed by an optional persistent tier.
///
/// All operations take `&self`; share the cache between threads with an
/// `Arc`. Operations that may wait on the write-behind queue (`put` under
/// [`OverflowPolicy::Block`](crate::config::OverflowPolicy::Block), `purge`,
/// `flush`, `destroy`) must not be called from an async runtime thread.
pub struct TileCache {
    config: CacheConfig,
    memory: MemoryTier,
    persistent: RwLock<Option<Arc<dyn TileTier>>>,
    pending: Arc<PendingWrites>,
    worker: Option<WriteBehindWorker>,
    stats: Arc<CacheStats>,
    logger: Arc<dyn Logger>,
    notifier: broadcast::Sender<TileKey>,
    destroyed: AtomicBool,
    /// Bumped by every purge and by destroy; invalidates in-flight promotions.
    purge_epoch: AtomicU64,
    /// Bumped before and after every `put` of a key hashing to the stripe.
    write_stripes: [AtomicU64; WRITE_STRIPES],
}

impl TileCache {
    /// Create a cache with an explicit persistent tier.
    ///
    /// # Arguments
    ///
    /// * `config` - Cache configuration
    /// * `persistent` - Persistent tier; required iff `config.persistent`
    /// * `logger` - Sink for storage failure reports
    ///
    /// # Errors
    ///
    /// [`TileCacheError::InvalidConfiguration`] if the configuration is
    /// rejected. No cache (and no worker thread) is created in that case.
    pub fn with_tiers(
        config: CacheConfig,
        persistent: Option<Arc<dyn TileTier>>,
        logger: Arc<dyn Logger>,
    ) -> Result<Self, TileCacheError> {
        config.validate()?;

        match (&persistent, config.persistent) {
            (None, true) => {
                return Err(TileCacheError::InvalidConfiguration(
                    "persistence enabled but no persistent tier supplied".to_string(),
                ))
            }
            (Some(_), false) => {
                return Err(TileCacheError::InvalidConfiguration(
                    "persistent tier supplied but persistence is disabled".to_string(),
                ))
            }
            _ => {}
        }

        let pending = Arc::new(PendingWrites::new());
        let stats = Arc::new(CacheStats::new());

        let worker = match &persistent {
            Some(store) if config.threaded => Some(WriteBehindWorker::spawn(
                Arc::clone(store),
                Arc::clone(&pending),
                Arc::clone(&stats),
                Arc::clone(&logger),
                config.queue_depth,
                config.overflow_policy,
            )?),
            _ => None,
        };

        let (notifier, _) = broadcast::channel(NOTIFY_CAPACITY);

        info!(
            capacity = %config.capacity,
            persistent = config.persistent,
            threaded = config.threaded,
            queue_depth = config.queue_depth,
            overflow = %config.overflow_policy,
            "Tile cache created"
        );

        Ok(Self {
            memory: MemoryTier::new(config.capacity),
            config,
            persistent: RwLock::new(persistent),
            pending,
            worker,
            stats,
            logger,
            notifier,
            destroyed: AtomicBool::new(false),
            purge_epoch: AtomicU64::new(0),
            write_stripes: std::array::from_fn(|_| AtomicU64::new(0)),
        })
    }

    /// Create a cache persisting to a [`FileSystemTier`] rooted at `directory`.
    ///
    /// The directory is ignored when `config.persistent` is false.
    pub fn open(
        config: CacheConfig,
        directory: impl Into<PathBuf>,
        logger: Arc<dyn Logger>,
    ) -> Result<Self, TileCacheError> {
        let persistent: Option<Arc<dyn TileTier>> = if config.persistent {
            let directory = directory.into();
            let tier = FileSystemTier::open(&directory).map_err(|e| {
                TileCacheError::InvalidConfiguration(format!(
                    "cannot open cache directory {}: {}",
                    directory.display(),
                    e
                ))
            })?;
            Some(Arc::new(tier) as Arc<dyn TileTier>)
        } else {
            None
        };

        Self::with_tiers(config, persistent, logger)
    }

    /// Create a memory-only cache.
    pub fn memory_only(
        capacity: Capacity,
        logger: Arc<dyn Logger>,
    ) -> Result<Self, TileCacheError> {
        Self::with_tiers(CacheConfig::memory_only(capacity), None, logger)
    }

    /// Look up a tile.
    ///
    /// Checks memory, then writes still queued for the persistent tier, then
    /// the persistent tier itself. Tiles found below memory are promoted into
    /// memory. Returns `None` on a miss; the caller is expected to render the
    /// tile and `put` it. A persistent read failure is reported, counted and
    /// treated as a miss.
    pub fn get(&self, key: &TileKey) -> Option<TileImage> {
        self.try_get(key).ok().flatten()
    }

    /// Like [`get`](Self::get), but surfaces failures.
    ///
    /// # Errors
    ///
    /// - [`TileCacheError::StorageRead`] if the persistent tier failed; the
    ///   failure is still reported and counted
    /// - [`TileCacheError::ShuttingDown`] after [`destroy`](Self::destroy)
    pub fn try_get(&self, key: &TileKey) -> Result<Option<TileImage>, TileCacheError> {
        // Captured before the destroyed check so a concurrent destroy always
        // invalidates the promotion below.
        let ticket = self.ticket(key);
        if self.is_destroyed() {
            return Err(TileCacheError::ShuttingDown);
        }

        if let Some(image) = self.memory.get(key) {
            self.stats.record_memory_hit();
            return Ok(Some(image));
        }

        let Some(store) = self.persistent_tier() else {
            self.stats.record_miss();
            return Ok(None);
        };

        if let Some(image) = self.pending.get(key) {
            self.stats.record_pending_hit();
            self.promote(key, &image, ticket);
            return Ok(Some(image));
        }

        match guarded(|| store.get(key)) {
            Ok(Some(image)) => {
                self.stats.record_persistent_hit();
                self.promote(key, &image, ticket);
                Ok(Some(image))
            }
            Ok(None) => {
                self.stats.record_miss();
                Ok(None)
            }
            Err(source) => {
                self.stats.record_read_failure();
                self.stats.record_miss();
                log_warn!(self.logger, "Persistent read failed for {}: {}", key, source);
                Err(TileCacheError::StorageRead {
                    key: key.to_string(),
                    source,
                })
            }
        }
    }

    /// Look up a tile in memory only, never touching the persistent tier.
    pub fn get_immediately(&self, key: &TileKey) -> Option<TileImage> {
        if self.is_destroyed() {
            return None;
        }

        let image = self.memory.get(key);
        match image {
            Some(_) => self.stats.record_memory_hit(),
            None => self.stats.record_miss(),
        }
        image
    }

    /// Whether a tile is available in any tier, without promoting it.
    pub fn contains_key(&self, key: &TileKey) -> bool {
        if self.is_destroyed() {
            return false;
        }
        if self.memory.contains(key) || self.pending.contains(key) {
            return true;
        }

        let Some(store) = self.persistent_tier() else {
            return false;
        };
        match guarded(|| store.contains(key)) {
            Ok(found) => found,
            Err(e) => {
                self.stats.record_read_failure();
                log_warn!(self.logger, "Persistent lookup failed for {}: {}", key, e);
                false
            }
        }
    }

    /// Insert or replace a tile.
    ///
    /// The memory insert always happens (unless the image alone exceeds a
    /// byte capacity). With persistence the image is written synchronously
    /// or queued for the worker, depending on `threaded`.
    ///
    /// # Errors
    ///
    /// - [`TileCacheError::QueueOverflow`] under the drop policy when the
    ///   queue is full; the tile stays in memory but is not persisted
    /// - [`TileCacheError::ShuttingDown`] after [`destroy`](Self::destroy)
    pub fn put(&self, key: TileKey, image: TileImage) -> Result<(), TileCacheError> {
        if self.is_destroyed() {
            return Err(TileCacheError::ShuttingDown);
        }

        let stripe = stripe_of(&key);
        self.write_stripes[stripe].fetch_add(1, Ordering::SeqCst);

        let outcome = self.memory.insert(key.clone(), image.clone());
        if !outcome.evicted.is_empty() {
            self.stats.record_evictions(outcome.evicted.len());
            debug!(count = outcome.evicted.len(), "Evicted tiles from memory tier");
        }
        if !outcome.admitted {
            debug!(key = %key, size = image.len(), "Tile larger than memory capacity");
        }

        let result = match (self.persistent_tier(), &self.worker) {
            (None, _) => Ok(()),
            (Some(_), Some(worker)) => self.enqueue(worker, &key, image),
            (Some(store), None) => {
                match guarded(|| store.put(&key, &image)) {
                    Ok(()) => self.stats.record_write(),
                    Err(e) => {
                        self.stats.record_write_failure();
                        log_error!(self.logger, "Persistent write failed for {}: {}", key, e);
                    }
                }
                Ok(())
            }
        };

        // A lookup that started while this put was in flight may have read
        // the previous image below memory.
        self.write_stripes[stripe].fetch_add(1, Ordering::SeqCst);

        // No subscribers is not an error.
        let _ = self.notifier.send(key);
        result
    }

    fn enqueue(
        &self,
        worker: &WriteBehindWorker,
        key: &TileKey,
        image: TileImage,
    ) -> Result<(), TileCacheError> {
        let generation = self.pending.insert(key.clone(), image.clone());
        match worker.submit(key.clone(), image, generation) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.pending.complete(key, generation);
                if let TileCacheError::QueueOverflow { depth } = e {
                    self.stats.record_queue_overflow();
                    log_warn!(
                        self.logger,
                        "Write queue full ({} pending), dropped persistent write for {}",
                        depth,
                        key
                    );
                }
                Err(e)
            }
        }
    }

    /// Return the cached tile, rendering and storing it on a miss.
    ///
    /// A dropped persistent write does not fail the call; the rendered tile
    /// is returned and the overflow is reported as for `put`.
    pub fn get_or_render(
        &self,
        key: &TileKey,
        renderer: &dyn TileRenderer,
    ) -> Result<TileImage, TileCacheError> {
        if let Some(image) = self.get(key) {
            return Ok(image);
        }
        if self.is_destroyed() {
            return Err(TileCacheError::ShuttingDown);
        }

        let image = renderer.render(key)?;
        match self.put(key.clone(), image.clone()) {
            Ok(()) | Err(TileCacheError::QueueOverflow { .. }) => Ok(image),
            Err(e) => Err(e),
        }
    }

    /// Remove every tile of `cache_id` from all tiers.
    ///
    /// In threaded mode the persistent purge runs on the worker after every
    /// write queued before this call, and this call waits for it. A failed
    /// persistent purge is reported and counted as zero removed entries.
    pub fn purge(&self, cache_id: &str) -> Result<PurgeResult, TileCacheError> {
        if self.is_destroyed() {
            return Err(TileCacheError::ShuttingDown);
        }

        self.pending.purge(cache_id);
        let persistent_entries = self.purge_persistent(Some(cache_id))?;
        // Memory goes last: a get that read the tile before the persistent
        // purge either promoted it already or sees the new epoch.
        self.purge_epoch.fetch_add(1, Ordering::SeqCst);
        let memory_entries = self.memory.purge(cache_id);

        let result = PurgeResult {
            memory_entries,
            persistent_entries,
        };
        info!(cache_id, %result, "Purged tile cache");
        Ok(result)
    }

    /// Remove every tile from all tiers.
    pub fn purge_all(&self) -> Result<PurgeResult, TileCacheError> {
        if self.is_destroyed() {
            return Err(TileCacheError::ShuttingDown);
        }

        self.pending.clear();
        let persistent_entries = self.purge_persistent(None)?;
        self.purge_epoch.fetch_add(1, Ordering::SeqCst);
        let memory_entries = self.memory.clear();

        let result = PurgeResult {
            memory_entries,
            persistent_entries,
        };
        info!(%result, "Cleared tile cache");
        Ok(result)
    }

    fn purge_persistent(&self, cache_id: Option<&str>) -> Result<usize, TileCacheError> {
        let Some(store) = self.persistent_tier() else {
            return Ok(0);
        };

        if let Some(worker) = &self.worker {
            return match worker.purge(cache_id) {
                Ok(removed) => Ok(removed),
                Err(TileCacheError::ShuttingDown) => Err(TileCacheError::ShuttingDown),
                Err(_) => {
                    // Already reported by the worker.
                    self.stats.record_write_failure();
                    Ok(0)
                }
            };
        }

        let result = guarded(|| match cache_id {
            Some(id) => store.purge(id),
            None => store.purge_all(),
        });
        match result {
            Ok(removed) => Ok(removed),
            Err(e) => {
                self.stats.record_write_failure();
                log_error!(
                    self.logger,
                    "Persistent purge of {} failed: {}",
                    cache_id.unwrap_or("*"),
                    e
                );
                Ok(0)
            }
        }
    }

    /// Block until every write queued before this call has been applied.
    ///
    /// Returns immediately when writes are synchronous or persistence is off.
    pub fn flush(&self) -> Result<(), TileCacheError> {
        if self.is_destroyed() {
            return Err(TileCacheError::ShuttingDown);
        }
        match &self.worker {
            Some(worker) => worker.flush(),
            None => Ok(()),
        }
    }

    /// Change the memory capacity, evicting least recently used tiles if it shrank.
    pub fn set_capacity(&self, capacity: Capacity) -> Result<(), TileCacheError> {
        CacheConfig {
            capacity,
            ..self.config.clone()
        }
        .validate()?;

        let evicted = self.memory.set_capacity(capacity);
        self.stats.record_evictions(evicted.len());
        debug!(%capacity, evicted = evicted.len(), "Memory capacity changed");
        Ok(())
    }

    /// Current memory capacity.
    pub fn capacity(&self) -> Capacity {
        self.memory.capacity()
    }

    /// Receive the key of every tile stored from now on.
    ///
    /// A subscriber that falls more than a bounded number of keys behind
    /// receives `RecvError::Lagged` and skips ahead.
    pub fn subscribe(&self) -> broadcast::Receiver<TileKey> {
        self.notifier.subscribe()
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        let queued = self.worker.as_ref().map_or(0, WriteBehindWorker::queued);
        self.stats
            .snapshot(self.memory.len(), self.memory.resident_bytes(), queued)
    }

    /// Configuration the cache was created with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of tiles resident in memory.
    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Shut the cache down.
    ///
    /// Stops accepting work, lets the worker apply every queued write, joins
    /// it, clears memory and releases the persistent tier. Idempotent; also
    /// run on drop.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(worker) = &self.worker {
            worker.shutdown();
        }

        self.purge_epoch.fetch_add(1, Ordering::SeqCst);
        let cleared = self.memory.clear();
        self.pending.clear();
        self.persistent.write().take();

        info!(cleared, "Tile cache destroyed");
    }

    fn persistent_tier(&self) -> Option<Arc<dyn TileTier>> {
        self.persistent.read().clone()
    }

    fn ticket(&self, key: &TileKey) -> PromotionTicket {
        let stripe = stripe_of(key);
        PromotionTicket {
            purge_epoch: self.purge_epoch.load(Ordering::SeqCst),
            stripe,
            writes: self.write_stripes[stripe].load(Ordering::SeqCst),
        }
    }

    /// Copy a tile read below memory into memory.
    ///
    /// Skipped when the key is already resident, or when a `put` on its
    /// stripe or a purge or destroy began after `ticket` was taken.
    fn promote(&self, key: &TileKey, image: &TileImage, ticket: PromotionTicket) {
        let promoted = self.memory.insert_if_absent(key.clone(), image.clone(), || {
            self.purge_epoch.load(Ordering::SeqCst) == ticket.purge_epoch
                && self.write_stripes[ticket.stripe].load(Ordering::SeqCst) == ticket.writes
        });
        match promoted {
            Some(outcome) if !outcome.evicted.is_empty() => {
                self.stats.record_evictions(outcome.evicted.len());
            }
            Some(_) => {}
            None => debug!(key = %key, "Promotion skipped"),
        }
    }
}

fn stripe_of(key: &TileKey) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % WRITE_STRIPES as u64) as usize
}

impl Drop for TileCache {
    fn drop(&mut self) {
        self.destroy();
    }
}
