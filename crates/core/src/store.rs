//! Capacity-bounded per-job stores.
//!
//! [`BoundedStore`] keeps at most `capacity` entries keyed by [`JobHandle`],
//! evicting the least recently used entry on overflow. Entries are also
//! dropped explicitly via [`BoundedStore::remove`] once a job is released.
//!
//! Each job's entry has a single writer (its poller or its analysis
//! session), so the inner mutex is only ever held for short, non-async
//! critical sections.

use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;

use crate::types::{AnalyzablePayload, JobHandle, ResultRecord};

/// `JobHandle → AnalyzablePayload`, written by the bundle materializer.
pub type PayloadStore = BoundedStore<AnalyzablePayload>;

/// `JobHandle → ResultRecord`, written by the analysis session.
pub type ResultStore = BoundedStore<ResultRecord>;

/// Default number of entries kept per store.
pub const DEFAULT_STORE_CAPACITY: usize = 64;

/// LRU map keyed by job handle.
#[derive(Debug)]
pub struct BoundedStore<V> {
    capacity: usize,
    entries: Mutex<IndexMap<JobHandle, V>>,
}

impl<V: Clone> BoundedStore<V> {
    /// Create a store holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(IndexMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clone the entry for `job`, marking it most recently used.
    pub fn get(&self, job: &JobHandle) -> Option<V> {
        let mut entries = self.lock();
        let index = entries.get_index_of(job)?;
        let last = entries.len() - 1;
        entries.move_index(index, last);
        entries.get_index(last).map(|(_, v)| v.clone())
    }

    pub fn contains(&self, job: &JobHandle) -> bool {
        self.lock().contains_key(job)
    }

    /// Insert `value` unless an entry already exists.
    ///
    /// Returns the stored value: the existing one if present, else `value`.
    pub fn insert_if_absent(&self, job: JobHandle, value: V) -> V {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(&job) {
            return existing.clone();
        }
        Self::insert_locked(&mut entries, self.capacity, job, value.clone());
        value
    }

    /// Insert or replace the entry for `job`.
    pub fn insert(&self, job: JobHandle, value: V) {
        let mut entries = self.lock();
        entries.shift_remove(&job);
        Self::insert_locked(&mut entries, self.capacity, job, value);
    }

    pub fn remove(&self, job: &JobHandle) -> Option<V> {
        self.lock().shift_remove(job)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn insert_locked(
        entries: &mut IndexMap<JobHandle, V>,
        capacity: usize,
        job: JobHandle,
        value: V,
    ) {
        while entries.len() >= capacity {
            entries.shift_remove_index(0);
        }
        entries.insert(job, value);
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<JobHandle, V>> {
        // A panic while holding the guard cannot leave the map half-updated.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<V: Clone> Default for BoundedStore<V> {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_CAPACITY)
    }
}
