//! Write-behind worker for the persistent tier.
//!
//! A single dedicated thread drains a bounded FIFO queue of [`WriteJob`]s and
//! applies them to the persistent tier in submission order. Control jobs
//! (purge, flush) travel through the same queue, so a purge issued after a
//! put can never be overtaken by that put's write.
//!
//! ```text
//!  put() ──► PendingWrites ──► mpsc (depth N) ──► worker thread ──► TileTier
//!                 ▲                                     │
//!                 └──────────── complete(gen) ──────────┘
//! ```
//!
//! The queue is a `tokio::sync::mpsc` channel driven through its blocking
//! API. Blocking calls panic inside an async runtime thread, so callers on a
//! runtime must go through `spawn_blocking`.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::error::TileCacheError;
use super::stats::CacheStats;
use super::traits::{StorageError, TileTier};
use crate::config::OverflowPolicy;
use crate::key::{TileImage, TileKey};
use crate::log::Logger;
use crate::log_error;

/// Work items for the persistent tier.
pub(crate) enum WriteJob {
    Store {
        key: TileKey,
        image: TileImage,
        generation: u64,
    },
    Purge {
        /// `None` purges every identifier.
        cache_id: Option<String>,
        done: oneshot::Sender<Result<usize, StorageError>>,
    },
    Flush {
        done: oneshot::Sender<()>,
    },
}

/// Images accepted by `put` whose persistent write has not landed yet.
///
/// Lets `get` serve a tile that was evicted from memory while its write was
/// still queued. Each insert gets a generation so a completed older write
/// never removes a newer pending image for the same key.
#[derive(Default)]
pub struct PendingWrites {
    entries: Mutex<HashMap<TileKey, (u64, TileImage)>>,
    generation: AtomicU64,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a queued write and return its generation.
    pub fn insert(&self, key: TileKey, image: TileImage) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().insert(key, (generation, image));
        generation
    }

    pub fn get(&self, key: &TileKey) -> Option<TileImage> {
        self.entries.lock().get(key).map(|(_, image)| image.clone())
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Forget a write once it landed (or failed), unless a newer one replaced it.
    pub fn complete(&self, key: &TileKey, generation: u64) {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|(g, _)| *g == generation) {
            entries.remove(key);
        }
    }

    pub fn purge(&self, cache_id: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| key.cache_id() != cache_id);
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Run a tier call, turning a panic into a [`StorageError`].
pub(crate) fn guarded<T>(
    call: impl FnOnce() -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    match panic::catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(StorageError::Panicked(message))
        }
    }
}

/// Handle to the background writer thread.
pub struct WriteBehindWorker {
    sender: Mutex<Option<mpsc::Sender<WriteJob>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    depth: usize,
    policy: OverflowPolicy,
}

impl WriteBehindWorker {
    /// Spawn the worker thread.
    ///
    /// # Arguments
    ///
    /// * `store` - Persistent tier the worker writes to
    /// * `pending` - Pending-write set shared with the cache
    /// * `stats` - Counters shared with the cache
    /// * `logger` - Failure report sink
    /// * `depth` - Queue capacity (must be > 0)
    /// * `policy` - Behaviour of `submit` when the queue is full
    pub fn spawn(
        store: Arc<dyn TileTier>,
        pending: Arc<PendingWrites>,
        stats: Arc<CacheStats>,
        logger: Arc<dyn Logger>,
        depth: usize,
        policy: OverflowPolicy,
    ) -> Result<Self, TileCacheError> {
        if depth == 0 {
            return Err(TileCacheError::InvalidConfiguration(
                "queue depth must be greater than 0".to_string(),
            ));
        }

        let (sender, receiver) = mpsc::channel(depth);
        let handle = std::thread::Builder::new()
            .name("tilecache-writer".to_string())
            .spawn(move || run(receiver, store, pending, stats, logger))
            .map_err(|e| {
                TileCacheError::InvalidConfiguration(format!("cannot spawn writer thread: {}", e))
            })?;

        debug!(depth, ?policy, "Started write-behind worker");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
            depth,
            policy,
        })
    }

    /// Queue capacity.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Jobs currently waiting in the queue.
    pub fn queued(&self) -> usize {
        match self.sender.lock().as_ref() {
            Some(sender) => self.depth - sender.capacity(),
            None => 0,
        }
    }

    /// Queue a tile write according to the overflow policy.
    ///
    /// With [`OverflowPolicy::Block`] the caller waits for a free slot. With
    /// [`OverflowPolicy::Drop`] a full queue returns
    /// [`TileCacheError::QueueOverflow`] and the write is discarded.
    pub fn submit(
        &self,
        key: TileKey,
        image: TileImage,
        generation: u64,
    ) -> Result<(), TileCacheError> {
        let sender = self.sender()?;
        let job = WriteJob::Store {
            key,
            image,
            generation,
        };

        match self.policy {
            OverflowPolicy::Block => sender
                .blocking_send(job)
                .map_err(|_| TileCacheError::ShuttingDown),
            OverflowPolicy::Drop => match sender.try_send(job) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => {
                    Err(TileCacheError::QueueOverflow { depth: self.depth })
                }
                Err(TrySendError::Closed(_)) => Err(TileCacheError::ShuttingDown),
            },
        }
    }

    /// Purge one identifier (or everything) after all previously queued writes.
    ///
    /// Always waits for a queue slot regardless of the overflow policy.
    pub fn purge(&self, cache_id: Option<&str>) -> Result<usize, TileCacheError> {
        let sender = self.sender()?;
        let (done, result) = oneshot::channel();
        sender
            .blocking_send(WriteJob::Purge {
                cache_id: cache_id.map(str::to_string),
                done,
            })
            .map_err(|_| TileCacheError::ShuttingDown)?;

        let result = result
            .blocking_recv()
            .map_err(|_| TileCacheError::ShuttingDown)?;
        result.map_err(|source| TileCacheError::StorageWrite {
            key: cache_id.unwrap_or("*").to_string(),
            source,
        })
    }

    /// Block until every job queued before this call has been applied.
    pub fn flush(&self) -> Result<(), TileCacheError> {
        let sender = self.sender()?;
        let (done, result) = oneshot::channel();
        sender
            .blocking_send(WriteJob::Flush { done })
            .map_err(|_| TileCacheError::ShuttingDown)?;
        result
            .blocking_recv()
            .map_err(|_| TileCacheError::ShuttingDown)
    }

    /// Stop accepting jobs, let the worker drain the queue, and join it.
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Write-behind worker terminated abnormally");
            }
            debug!("Write-behind worker stopped");
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<WriteJob>, TileCacheError> {
        self.sender
            .lock()
            .as_ref()
            .cloned()
            .ok_or(TileCacheError::ShuttingDown)
    }
}

impl Drop for WriteBehindWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    mut receiver: mpsc::Receiver<WriteJob>,
    store: Arc<dyn TileTier>,
    pending: Arc<PendingWrites>,
    stats: Arc<CacheStats>,
    logger: Arc<dyn Logger>,
) {
    while let Some(job) = receiver.blocking_recv() {
        match job {
            WriteJob::Store {
                key,
                image,
                generation,
            } => {
                match guarded(|| store.put(&key, &image)) {
                    Ok(()) => stats.record_write(),
                    Err(e) => {
                        stats.record_write_failure();
                        log_error!(logger, "Persistent write failed for {}: {}", key, e);
                    }
                }
                pending.complete(&key, generation);
            }
            WriteJob::Purge { cache_id, done } => {
                let result = guarded(|| match cache_id.as_deref() {
                    Some(id) => store.purge(id),
                    None => store.purge_all(),
                });
                if let Err(ref e) = result {
                    log_error!(
                        logger,
                        "Persistent purge of {} failed: {}",
                        cache_id.as_deref().unwrap_or("*"),
                        e
                    );
                }
                let _ = done.send(result);
            }
            WriteJob::Flush { done } => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryTier;
    use crate::config::Capacity;
    use crate::log::{NoOpLogger, RecordingLogger};

    struct PanickingTier;

    impl TileTier for PanickingTier {
        fn get(&self, _key: &TileKey) -> Result<Option<TileImage>, StorageError> {
            Ok(None)
        }
        fn put(&self, key: &TileKey, _image: &TileImage) -> Result<(), StorageError> {
            if key.x() == 0 {
                panic!("disk on fire");
            }
            Ok(())
        }
        fn delete(&self, _key: &TileKey) -> Result<bool, StorageError> {
            Ok(false)
        }
        fn purge(&self, _cache_id: &str) -> Result<usize, StorageError> {
            Err(StorageError::Backend("read-only".to_string()))
        }
        fn purge_all(&self) -> Result<usize, StorageError> {
            Ok(0)
        }
    }

    fn spawn_worker(
        store: Arc<dyn TileTier>,
        logger: Arc<dyn Logger>,
    ) -> (WriteBehindWorker, Arc<PendingWrites>, Arc<CacheStats>) {
        let pending = Arc::new(PendingWrites::new());
        let stats = Arc::new(CacheStats::new());
        let worker = WriteBehindWorker::spawn(
            store,
            Arc::clone(&pending),
            Arc::clone(&stats),
            logger,
            4,
            OverflowPolicy::Block,
        )
        .unwrap();
        (worker, pending, stats)
    }

    #[test]
    fn test_zero_depth_rejected() {
        let result = WriteBehindWorker::spawn(
            Arc::new(MemoryTier::new(Capacity::Entries(1))),
            Arc::new(PendingWrites::new()),
            Arc::new(CacheStats::new()),
            Arc::new(NoOpLogger),
            0,
            OverflowPolicy::Block,
        );
        assert!(matches!(
            result,
            Err(TileCacheError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_writes_land_in_order_and_clear_pending() {
        let store = Arc::new(MemoryTier::new(Capacity::Entries(100)));
        let (worker, pending, stats) = spawn_worker(store.clone(), Arc::new(NoOpLogger));

        let key = TileKey::new("w", 1, 1, 1);
        for value in 0..10u8 {
            let image = TileImage::new(vec![value]);
            let generation = pending.insert(key.clone(), image.clone());
            worker.submit(key.clone(), image, generation).unwrap();
        }
        worker.flush().unwrap();

        assert_eq!(store.peek(&key).unwrap().as_bytes(), &[9]);
        assert!(pending.is_empty());
        assert_eq!(stats.snapshot(0, 0, 0).writes_completed, 10);
    }

    #[test]
    fn test_panic_in_store_is_reported_and_loop_survives() {
        let logger = Arc::new(RecordingLogger::new());
        let (worker, _pending, stats) = spawn_worker(Arc::new(PanickingTier), logger.clone());

        worker
            .submit(TileKey::new("w", 1, 0, 0), TileImage::new(vec![1u8]), 0)
            .unwrap();
        worker
            .submit(TileKey::new("w", 1, 1, 0), TileImage::new(vec![1u8]), 1)
            .unwrap();
        worker.flush().unwrap();

        let snapshot = stats.snapshot(0, 0, 0);
        assert_eq!(snapshot.write_failures, 1);
        assert_eq!(snapshot.writes_completed, 1);
        assert!(logger.contains("disk on fire"));
    }

    #[test]
    fn test_purge_error_is_returned_and_reported() {
        let logger = Arc::new(RecordingLogger::new());
        let (worker, _pending, _stats) = spawn_worker(Arc::new(PanickingTier), logger.clone());

        let result = worker.purge(Some("w"));

        assert!(matches!(result, Err(TileCacheError::StorageWrite { .. })));
        assert!(logger.contains("read-only"));
    }

    #[test]
    fn test_shutdown_drains_queue_and_is_idempotent() {
        let store = Arc::new(MemoryTier::new(Capacity::Entries(100)));
        let (worker, _pending, _stats) = spawn_worker(store.clone(), Arc::new(NoOpLogger));

        for x in 0..4 {
            worker
                .submit(TileKey::new("w", 2, x, 0), TileImage::new(vec![0u8]), x as u64)
                .unwrap();
        }
        worker.shutdown();
        worker.shutdown();

        assert_eq!(store.len(), 4);
        assert!(matches!(
            worker.submit(TileKey::new("w", 2, 9, 9), TileImage::new(vec![0u8]), 99),
            Err(TileCacheError::ShuttingDown)
        ));
        assert!(matches!(worker.flush(), Err(TileCacheError::ShuttingDown)));
    }

    #[test]
    fn test_pending_complete_respects_generation() {
        let pending = PendingWrites::new();
        let key = TileKey::new("p", 1, 0, 0);
        let old = pending.insert(key.clone(), TileImage::new(vec![1u8]));
        let _new = pending.insert(key.clone(), TileImage::new(vec![2u8]));

        pending.complete(&key, old);

        assert_eq!(pending.get(&key).unwrap().as_bytes(), &[2]);
    }

    #[test]
    fn test_pending_purge_by_identifier() {
        let pending = PendingWrites::new();
        pending.insert(TileKey::new("a", 1, 0, 0), TileImage::new(vec![1u8]));
        pending.insert(TileKey::new("b", 1, 0, 0), TileImage::new(vec![1u8]));

        assert_eq!(pending.purge("a"), 1);
        assert_eq!(pending.len(), 1);
        assert!(pending.contains(&TileKey::new("b", 1, 0, 0)));
    }
}
