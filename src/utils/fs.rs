use std::path::{Path, PathBuf};
use crate::errors::KevError;

/// Atomic file write: write to temp, then rename
pub async fn atomic_write(path: &Path, content: &str) -> Result<(), KevError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// `<path><suffix>` next to `path`, keeping its full file name.
pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}
