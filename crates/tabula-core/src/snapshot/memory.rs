//! In-memory snapshot store backed by `DashMap`.
//!
//! Entries are immutable, so concurrent sessions share the map without any
//! lock beyond DashMap's own sharding. An optional byte budget turns
//! unbounded growth into a reported `StoreError::Exhausted`.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use tabula_types::dataset::DatasetHandle;
use tabula_types::error::StoreError;

use super::{Blob, SnapshotStore};

pub struct InMemorySnapshotStore {
    entries: DashMap<DatasetHandle, Blob>,
    used_bytes: AtomicU64,
    max_bytes: Option<u64>,
}

impl InMemorySnapshotStore {
    /// Unbounded store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            used_bytes: AtomicU64::new(0),
            max_bytes: None,
        }
    }

    /// Store that refuses writes once `max_bytes` of blobs are held.
    pub fn with_max_bytes(max_bytes: u64) -> Self {
        Self {
            max_bytes: Some(max_bytes),
            ..Self::new()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn used_bytes(&self) -> u64 {
        self.used_bytes.load(Ordering::Acquire)
    }

    /// Reserve `size` bytes against the budget.
    fn reserve(&self, size: u64) -> Result<(), StoreError> {
        let Some(limit) = self.max_bytes else {
            self.used_bytes.fetch_add(size, Ordering::AcqRel);
            return Ok(());
        };

        self.used_bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|total| *total <= limit)
            })
            .map(|_| ())
            .map_err(|used| StoreError::Exhausted {
                used,
                limit,
                requested: size,
            })
    }
}

impl Default for InMemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    async fn write(&self, blob: Blob) -> Result<DatasetHandle, StoreError> {
        let size = blob.len() as u64;
        self.reserve(size)?;

        // v7 handles do not collide in practice; a collision still must not
        // overwrite an existing entry.
        loop {
            let handle = DatasetHandle::new();
            if let Entry::Vacant(slot) = self.entries.entry(handle) {
                slot.insert(blob);
                tracing::debug!(handle = %handle, bytes = size, "snapshot written");
                return Ok(handle);
            }
        }
    }

    async fn read(&self, handle: &DatasetHandle) -> Result<Blob, StoreError> {
        self.entries
            .get(handle)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound(*handle))
    }
}
