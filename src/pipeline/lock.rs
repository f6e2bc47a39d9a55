use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use chrono::Utc;
use crate::errors::KevError;
use tracing::{debug, warn};

/// Exclusive claim on an output/checkpoint pair, held for the engine's lifetime.
///
/// The claim is a kernel advisory lock on `<out>.lock`, so it dies with the
/// process however the process ends. The file itself stays behind and only
/// records the last holder.
pub struct RunLock {
    path: PathBuf,
    file: File,
}

impl RunLock {
    pub fn acquire(path: &Path) -> Result<Self, KevError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let persistence = |e: std::io::Error| KevError::Persistence(format!("{}: {}", path.display(), e));

        let mut file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(persistence)?;

        if let Err(e) = fs2::FileExt::try_lock_exclusive(&file) {
            if is_contended(&e) {
                let holder = std::fs::read_to_string(path).unwrap_or_default();
                return Err(KevError::Locked(format!(
                    "{} is held by another run ({})",
                    path.display(),
                    holder.trim()
                )));
            }
            return Err(persistence(e));
        }

        let previous = std::fs::read_to_string(path).unwrap_or_default();
        if !previous.trim().is_empty() {
            debug!(path = %path.display(), previous = %previous.trim(), "Reclaiming lock left by an earlier run");
        }

        file.set_len(0).map_err(persistence)?;
        file.seek(SeekFrom::Start(0)).map_err(persistence)?;
        writeln!(file, "pid={} started={}", std::process::id(), Utc::now().to_rfc3339()).map_err(persistence)?;
        file.sync_all().map_err(persistence)?;

        debug!(path = %path.display(), "Run lock acquired");
        Ok(Self { path: path.to_path_buf(), file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // Closing the descriptor releases it too; unlocking first keeps the release explicit
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
        }
    }
}
