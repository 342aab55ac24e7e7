//! In-memory tier with strict LRU eviction.
//!
//! The index is a `HashMap` from key to entry plus a `BTreeMap` ordered by a
//! monotonically increasing access sequence. Every read or write of an entry
//! moves it to the back of the ordering, and eviction pops from the front.
//! Because the sequence is unique per access, ties on access time are broken
//! by insertion order.
//!
//! Both structures live behind one `parking_lot::Mutex`; a `get` must update
//! recency, so a reader/writer split would not let readers run in parallel
//! anyway. The lock is never held across I/O.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::trace;

use super::traits::{StorageError, TileTier};
use crate::config::Capacity;
use crate::key::{TileImage, TileKey};

/// A resident tile and its bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: TileKey,
    pub image: TileImage,
    pub size_bytes: u64,
    /// Last time the entry was read or written.
    pub last_access: Instant,
    sequence: u64,
}

/// Result of inserting into the memory tier.
#[derive(Debug, Default)]
pub struct InsertOutcome {
    /// False when the image alone exceeds the byte capacity.
    pub admitted: bool,
    /// Keys evicted to make room, oldest first.
    pub evicted: Vec<TileKey>,
}

struct LruState {
    entries: HashMap<TileKey, CacheEntry>,
    order: BTreeMap<u64, TileKey>,
    next_sequence: u64,
    resident_bytes: u64,
    capacity: Capacity,
}

impl LruState {
    fn new(capacity: Capacity) -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_sequence: 0,
            resident_bytes: 0,
            capacity,
        }
    }

    fn next_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    fn touch(&mut self, key: &TileKey) -> Option<TileImage> {
        let seq = self.next_sequence();
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.sequence);
        entry.sequence = seq;
        entry.last_access = Instant::now();
        self.order.insert(seq, key.clone());
        Some(entry.image.clone())
    }

    fn remove(&mut self, key: &TileKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.sequence);
        self.resident_bytes -= entry.size_bytes;
        Some(entry)
    }

    fn fits(&self, size: u64) -> bool {
        match self.capacity {
            Capacity::Bytes(max) => size <= max,
            Capacity::Entries(max) => max > 0,
        }
    }

    fn over_capacity(&self) -> bool {
        match self.capacity {
            Capacity::Bytes(max) => self.resident_bytes > max,
            Capacity::Entries(max) => self.entries.len() > max,
        }
    }

    fn evict_until_within_capacity(&mut self) -> Vec<TileKey> {
        let mut evicted = Vec::new();
        while self.over_capacity() {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.resident_bytes -= entry.size_bytes;
            }
            evicted.push(key);
        }
        evicted
    }

    fn insert(&mut self, key: TileKey, image: TileImage) -> InsertOutcome {
        let size_bytes = image.len() as u64;

        // A replaced value must never be served again, even if the new one is not admitted.
        self.remove(&key);

        if !self.fits(size_bytes) {
            return InsertOutcome {
                admitted: false,
                evicted: Vec::new(),
            };
        }

        let sequence = self.next_sequence();
        self.order.insert(sequence, key.clone());
        self.resident_bytes += size_bytes;
        self.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                image,
                size_bytes,
                last_access: Instant::now(),
                sequence,
            },
        );

        InsertOutcome {
            admitted: true,
            evicted: self.evict_until_within_capacity(),
        }
    }
}

/// Bounded in-memory tile tier.
pub struct MemoryTier {
    state: Mutex<LruState>,
}

impl MemoryTier {
    /// Create an empty memory tier.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum resident size, in bytes or in entries
    pub fn new(capacity: Capacity) -> Self {
        Self {
            state: Mutex::new(LruState::new(capacity)),
        }
    }

    /// Look up a tile and mark it most recently used.
    pub fn get(&self, key: &TileKey) -> Option<TileImage> {
        self.state.lock().touch(key)
    }

    /// Look up a tile without changing its recency.
    pub fn peek(&self, key: &TileKey) -> Option<TileImage> {
        self.state
            .lock()
            .entries
            .get(key)
            .map(|entry| entry.image.clone())
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Insert or replace a tile, evicting least recently used entries as needed.
    pub fn insert(&self, key: TileKey, image: TileImage) -> InsertOutcome {
        let outcome = self.state.lock().insert(key, image);
        for key in &outcome.evicted {
            trace!(key = %key, "Evicted tile from memory tier");
        }
        outcome
    }

    /// Insert a tile only if its key is not resident and `still_valid` holds.
    ///
    /// `still_valid` runs under the tier lock, so no insert, purge or clear
    /// can interleave between the check and the insert. Returns `None` when
    /// nothing was inserted.
    pub fn insert_if_absent(
        &self,
        key: TileKey,
        image: TileImage,
        still_valid: impl FnOnce() -> bool,
    ) -> Option<InsertOutcome> {
        let mut state = self.state.lock();
        if state.entries.contains_key(&key) || !still_valid() {
            return None;
        }
        let outcome = state.insert(key, image);
        drop(state);

        for key in &outcome.evicted {
            trace!(key = %key, "Evicted tile from memory tier");
        }
        Some(outcome)
    }

    /// Remove one tile. Returns `true` if it was resident.
    pub fn remove(&self, key: &TileKey) -> bool {
        self.state.lock().remove(key).is_some()
    }

    /// Remove every tile whose key carries `cache_id`.
    pub fn purge(&self, cache_id: &str) -> usize {
        let mut state = self.state.lock();
        let doomed: Vec<TileKey> = state
            .entries
            .keys()
            .filter(|key| key.cache_id() == cache_id)
            .cloned()
            .collect();
        for key in &doomed {
            state.remove(key);
        }
        doomed.len()
    }

    /// Remove every tile. Returns the number removed.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let removed = state.entries.len();
        state.entries.clear();
        state.order.clear();
        state.resident_bytes = 0;
        removed
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Total size of resident images in bytes.
    pub fn resident_bytes(&self) -> u64 {
        self.state.lock().resident_bytes
    }

    pub fn capacity(&self) -> Capacity {
        self.state.lock().capacity
    }

    /// Change the capacity, evicting least recently used entries if it shrank.
    pub fn set_capacity(&self, capacity: Capacity) -> Vec<TileKey> {
        let mut state = self.state.lock();
        state.capacity = capacity;
        state.evict_until_within_capacity()
    }

    /// Resident keys ordered from least to most recently used.
    pub fn keys_by_recency(&self) -> Vec<TileKey> {
        self.state.lock().order.values().cloned().collect()
    }

    /// Snapshot of one entry's bookkeeping.
    pub fn entry(&self, key: &TileKey) -> Option<CacheEntry> {
        self.state.lock().entries.get(key).cloned()
    }
}

impl TileTier for MemoryTier {
    fn get(&self, key: &TileKey) -> Result<Option<TileImage>, StorageError> {
        Ok(MemoryTier::get(self, key))
    }

    fn put(&self, key: &TileKey, image: &TileImage) -> Result<(), StorageError> {
        self.insert(key.clone(), image.clone());
        Ok(())
    }

    fn delete(&self, key: &TileKey) -> Result<bool, StorageError> {
        Ok(self.remove(key))
    }

    fn contains(&self, key: &TileKey) -> Result<bool, StorageError> {
        Ok(MemoryTier::contains(self, key))
    }

    fn purge(&self, cache_id: &str) -> Result<usize, StorageError> {
        Ok(MemoryTier::purge(self, cache_id))
    }

    fn purge_all(&self) -> Result<usize, StorageError> {
        Ok(self.clear())
    }
}
