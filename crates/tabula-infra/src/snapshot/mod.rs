//! Snapshot store adapters and runtime backend selection.

pub mod filesystem;

use std::path::Path;

use tabula_core::snapshot::memory::InMemorySnapshotStore;
use tabula_core::snapshot::{Blob, SnapshotStore};
use tabula_types::config::{StorageBackend, StorageConfig};
use tabula_types::dataset::DatasetHandle;
use tabula_types::error::StoreError;

pub use filesystem::FsSnapshotStore;

/// Snapshot store chosen by `[storage] backend`.
pub enum SnapshotBackend {
    Memory(InMemorySnapshotStore),
    Filesystem(FsSnapshotStore),
}

impl SnapshotBackend {
    /// Build the configured store. The filesystem backend lives under
    /// `{data_dir}/snapshots`.
    pub async fn from_config(config: &StorageConfig, data_dir: &Path) -> Result<Self, StoreError> {
        let backend = match config.backend {
            StorageBackend::Memory => Self::Memory(match config.max_bytes {
                Some(limit) => InMemorySnapshotStore::with_max_bytes(limit),
                None => InMemorySnapshotStore::new(),
            }),
            StorageBackend::Filesystem => {
                Self::Filesystem(FsSnapshotStore::open(data_dir.join("snapshots")).await?)
            }
        };
        tracing::info!(backend = backend.name(), "snapshot store ready");
        Ok(backend)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Filesystem(_) => "filesystem",
        }
    }
}

impl SnapshotStore for SnapshotBackend {
    async fn write(&self, blob: Blob) -> Result<DatasetHandle, StoreError> {
        match self {
            Self::Memory(store) => store.write(blob).await,
            Self::Filesystem(store) => store.write(blob).await,
        }
    }

    async fn read(&self, handle: &DatasetHandle) -> Result<Blob, StoreError> {
        match self {
            Self::Memory(store) => store.read(handle).await,
            Self::Filesystem(store) => store.read(handle).await,
        }
    }
}
