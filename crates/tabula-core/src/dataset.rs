//! Dataset codec trait: parsing, statistics and import/export.
//!
//! The engine never looks inside a blob itself. Everything that depends on
//! the tabular format goes through a `DatasetCodec`.

use std::future::Future;
use std::path::Path;

use tabula_types::dataset::DatasetSummary;
use tabula_types::error::DatasetError;

/// Trait for the tabular format a session works on.
///
/// Implementations live in tabula-infra (e.g., `CsvCodec`).
pub trait DatasetCodec: Send + Sync {
    /// Compute statistics for `blob`. Fails if `blob` is not a valid dataset.
    fn summarize(&self, blob: &[u8]) -> Result<DatasetSummary, DatasetError>;

    /// First `limit` records of `blob` as JSON objects keyed by column name.
    fn preview(&self, blob: &[u8], limit: usize) -> Result<Vec<serde_json::Value>, DatasetError>;

    /// Read a dataset from `path`.
    fn import(&self, path: &Path) -> impl Future<Output = Result<Vec<u8>, DatasetError>> + Send;

    /// Validate `blob` and write it to `path`. Returns the summary of what
    /// was written.
    fn export(
        &self,
        blob: &[u8],
        path: &Path,
    ) -> impl Future<Output = Result<DatasetSummary, DatasetError>> + Send;
}
