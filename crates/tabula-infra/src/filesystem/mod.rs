//! Data directory layout.

use std::path::{Path, PathBuf};

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `TABULA_DATA_DIR` environment variable
/// 2. `~/.tabula` under the home directory
/// 3. `./.tabula`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TABULA_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".tabula");
    }

    PathBuf::from(".tabula")
}

/// Where exports land when the user names only a file.
pub fn exports_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("exports")
}

/// Create the data directory and its fixed subdirectories.
pub async fn ensure_layout(data_dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(exports_dir(data_dir)).await
}
