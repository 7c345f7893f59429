//! Filesystem-backed [`SnapshotStore`].
//!
//! Layout under the store root:
//!
//! ```text
//! {root}/{handle}.blob     -- dataset bytes, created once, never rewritten
//! {root}/{handle}.sha256   -- hex SHA-256 of the blob, checked on every read
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use tabula_core::snapshot::{Blob, SnapshotStore};
use tabula_types::dataset::DatasetHandle;
use tabula_types::error::StoreError;

/// Snapshot store writing one file per handle.
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    root: PathBuf,
}

impl FsSnapshotStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| StoreError::Storage(format!("cannot create {}: {e}", root.display())))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, handle: &DatasetHandle) -> PathBuf {
        self.root.join(format!("{handle}.blob"))
    }

    fn digest_path(&self, handle: &DatasetHandle) -> PathBuf {
        self.root.join(format!("{handle}.sha256"))
    }

    async fn create_new(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(bytes).await?;
        file.sync_all().await
    }
}

fn digest_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

impl SnapshotStore for FsSnapshotStore {
    async fn write(&self, blob: Blob) -> Result<DatasetHandle, StoreError> {
        loop {
            let handle = DatasetHandle::new();
            match Self::create_new(&self.blob_path(&handle), &blob).await {
                Ok(()) => {
                    Self::create_new(&self.digest_path(&handle), digest_hex(&blob).as_bytes())
                        .await
                        .map_err(|e| StoreError::Storage(format!("digest for '{handle}': {e}")))?;
                    tracing::debug!(handle = %handle, bytes = blob.len(), "snapshot written");
                    return Ok(handle);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(StoreError::Storage(format!("write '{handle}': {e}"))),
            }
        }
    }

    async fn read(&self, handle: &DatasetHandle) -> Result<Blob, StoreError> {
        let bytes = match tokio::fs::read(self.blob_path(handle)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound(*handle)),
            Err(e) => return Err(StoreError::Storage(format!("read '{handle}': {e}"))),
        };

        let expected = tokio::fs::read_to_string(self.digest_path(handle))
            .await
            .map_err(|_| StoreError::Corrupted(*handle))?;
        if expected.trim() != digest_hex(&bytes) {
            tracing::warn!(handle = %handle, "snapshot digest mismatch");
            return Err(StoreError::Corrupted(*handle));
        }

        Ok(bytes.into())
    }
}
