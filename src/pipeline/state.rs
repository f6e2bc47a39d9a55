use std::path::PathBuf;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use crate::models::score::SnapshotMode;
use crate::utils::fs::sibling_path;

#[derive(Debug, Clone)]
pub struct EnrichConfig {
    pub year: i32,
    pub output_path: PathBuf,
    pub checkpoint_path: PathBuf,
    pub resume: bool,
    pub snapshot: SnapshotMode,
}

impl EnrichConfig {
    /// Checkpoint database defaults to `<output>.checkpoint.db`.
    pub fn new(year: i32, output_path: PathBuf, resume: bool, snapshot: SnapshotMode) -> Self {
        let checkpoint_path = sibling_path(&output_path, ".checkpoint.db");
        Self { year, output_path, checkpoint_path, resume, snapshot }
    }

    pub fn with_checkpoint_path(mut self, path: PathBuf) -> Self {
        self.checkpoint_path = path;
        self
    }

    pub fn lock_path(&self) -> PathBuf {
        sibling_path(&self.output_path, ".lock")
    }

    pub fn snapshot_date(&self) -> Option<NaiveDate> {
        match self.snapshot {
            SnapshotMode::AsOf(d) => Some(d),
            SnapshotMode::Latest => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub missing_at_inclusion: usize,
    pub missing_at_snapshot: usize,
    pub errors_at_inclusion: usize,
    pub errors_at_snapshot: usize,
    pub interrupted: bool,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed + self.skipped)
    }
}

/// Progress notifications for a UI layer.
#[derive(Debug, Clone)]
pub enum EnrichEvent {
    Started { total: usize, already_done: usize },
    Skipped { cve_id: String },
    Recorded { cve_id: String, degraded: bool },
    Finished { summary: RunSummary },
}
