//! Snapshot store trait.
//!
//! A snapshot store owns every dataset blob a session ever produces.
//! Sessions hold only [`DatasetHandle`]s. There is no update or delete
//! operation: once written, the bytes behind a handle never change.
//!
//! Implementations: [`memory::InMemorySnapshotStore`] here, and a
//! filesystem-backed store in tabula-infra.

pub mod memory;

use std::future::Future;
use std::sync::Arc;

use tabula_types::dataset::DatasetHandle;
use tabula_types::error::StoreError;

/// Immutable dataset bytes, cheap to clone.
pub type Blob = Arc<[u8]>;

/// Write-once blob store keyed by handle.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait SnapshotStore: Send + Sync {
    /// Store `blob` and return a fresh handle that has never been issued before.
    ///
    /// Fails only when the store cannot hold the blob (`StoreError::Exhausted`)
    /// or the backing medium errors.
    fn write(&self, blob: Blob) -> impl Future<Output = Result<DatasetHandle, StoreError>> + Send;

    /// Read the blob behind `handle`.
    ///
    /// Returns `StoreError::NotFound` for handles this store never produced.
    fn read(
        &self,
        handle: &DatasetHandle,
    ) -> impl Future<Output = Result<Blob, StoreError>> + Send;
}

impl<S: SnapshotStore> SnapshotStore for Arc<S> {
    fn write(&self, blob: Blob) -> impl Future<Output = Result<DatasetHandle, StoreError>> + Send {
        S::write(self, blob)
    }

    fn read(
        &self,
        handle: &DatasetHandle,
    ) -> impl Future<Output = Result<Blob, StoreError>> + Send {
        S::read(self, handle)
    }
}
