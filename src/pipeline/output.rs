use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use crate::errors::KevError;
use crate::models::record::EnrichedRecord;
use tracing::{info, warn};

/// Append-only JSON Lines writer for the merged dataset.
///
/// Each `append` is written, flushed and synced before returning.
pub struct RecordWriter {
    path: PathBuf,
    file: tokio::fs::File,
    appended: u64,
}

impl RecordWriter {
    /// Without `resume` the file is truncated. With it, a torn last line left
    /// by a crash is cut off so appends start on a clean line.
    pub async fn open(path: &Path, resume: bool) -> Result<Self, KevError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| persistence(path, e))?;
            }
        }

        let opened = if resume {
            let dropped = repair_torn_tail(path).await?;
            if dropped > 0 {
                warn!(path = %path.display(), bytes = dropped, "Discarded partial record from interrupted run");
            }
            tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
        } else {
            tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)
                .await
        };
        let file = opened.map_err(|e| persistence(path, e))?;

        Ok(Self { path: path.to_path_buf(), file, appended: 0 })
    }

    pub async fn append(&mut self, record: &EnrichedRecord) -> Result<(), KevError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        self.file.write_all(line.as_bytes()).await.map_err(|e| persistence(&self.path, e))?;
        self.file.flush().await.map_err(|e| persistence(&self.path, e))?;
        self.file.sync_data().await.map_err(|e| persistence(&self.path, e))?;

        self.appended += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appended(&self) -> u64 {
        self.appended
    }
}

fn persistence(path: &Path, e: std::io::Error) -> KevError {
    KevError::Persistence(format!("{}: {}", path.display(), e))
}

/// Truncate the file after its last newline. Returns the number of bytes cut.
async fn repair_torn_tail(path: &Path) -> Result<u64, KevError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(persistence(path, e)),
    };

    if bytes.last().map_or(true, |b| *b == b'\n') {
        return Ok(0);
    }

    let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |p| p + 1);
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(path)
        .await
        .map_err(|e| persistence(path, e))?;
    file.set_len(keep as u64).await.map_err(|e| persistence(path, e))?;
    file.sync_all().await.map_err(|e| persistence(path, e))?;

    Ok((bytes.len() - keep) as u64)
}

/// CVE ids that have a complete line in the output. A missing file has none.
pub async fn flushed_ids(path: &Path) -> Result<HashSet<String>, KevError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(persistence(path, e)),
    };

    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str::<EnrichedRecord>(line).ok())
        .map(|record| record.cve_id().to_string())
        .collect())
}

/// Merged dataset as read back for analysis.
#[derive(Debug, Default)]
pub struct Dataset {
    /// One record per CVE, in order of first appearance.
    pub records: Vec<EnrichedRecord>,
    pub duplicates: usize,
    pub malformed: usize,
}

/// Read a merged dataset, de-duplicating by CVE id (last write wins).
pub async fn read_dataset(path: &Path) -> Result<Dataset, KevError> {
    let content = tokio::fs::read_to_string(path).await
        .map_err(|e| KevError::Config(format!("Cannot read dataset {}: {}", path.display(), e)))?;

    let mut dataset = Dataset::default();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: EnrichedRecord = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                warn!(line = n + 1, error = %e, "Skipping malformed dataset line");
                dataset.malformed += 1;
                continue;
            }
        };

        match index.get(record.cve_id()) {
            Some(&pos) => {
                dataset.records[pos] = record;
                dataset.duplicates += 1;
            }
            None => {
                index.insert(record.cve_id().to_string(), dataset.records.len());
                dataset.records.push(record);
            }
        }
    }

    info!(
        path = %path.display(),
        records = dataset.records.len(),
        duplicates = dataset.duplicates,
        malformed = dataset.malformed,
        "Dataset loaded"
    );
    Ok(dataset)
}
