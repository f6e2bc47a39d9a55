use std::collections::HashSet;
use chrono::Utc;
use rusqlite::OptionalExtension;
use crate::errors::KevError;
use super::Database;
use tracing::{debug, info};

/// Durable set of CVE ids whose records have been flushed.
///
/// Loaded into memory once; `record` writes through to SQLite before the id
/// becomes visible to `contains`.
pub struct CheckpointStore {
    db: Database,
    epoch: i64,
    done: HashSet<String>,
    next_seq: i64,
}

impl CheckpointStore {
    /// With `resume`, continue the current epoch and load its ids. Without it,
    /// open a new epoch so earlier checkpoints no longer apply.
    pub fn open(db: Database, resume: bool) -> Result<Self, KevError> {
        let (epoch, done, next_seq) = {
            let conn = db.conn.lock().unwrap();

            let current: Option<i64> = conn
                .query_row(
                    "SELECT value FROM checkpoint_meta WHERE key = 'current_epoch'",
                    [],
                    |row| row.get::<_, String>(0),
                )
                .optional()?
                .and_then(|v| v.parse().ok());

            let epoch = match (current, resume) {
                (Some(e), true) => e,
                (Some(e), false) => e + 1,
                (None, _) => 1,
            };

            conn.execute(
                "INSERT INTO checkpoint_meta (key, value) VALUES ('current_epoch', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![epoch.to_string()],
            )?;

            let mut stmt = conn.prepare(
                "SELECT cve_id FROM checkpoints WHERE epoch = ?1 ORDER BY seq",
            )?;
            let done = stmt
                .query_map(rusqlite::params![epoch], |row| row.get::<_, String>(0))?
                .collect::<Result<HashSet<String>, _>>()?;

            let max_seq: Option<i64> = conn.query_row(
                "SELECT MAX(seq) FROM checkpoints WHERE epoch = ?1",
                rusqlite::params![epoch],
                |row| row.get(0),
            )?;

            (epoch, done, max_seq.map_or(0, |s| s + 1))
        };

        info!(epoch, resume, already_done = done.len(), "Checkpoint store opened");
        Ok(Self { db, epoch, done, next_seq })
    }

    pub fn epoch(&self) -> i64 {
        self.epoch
    }

    pub fn contains(&self, cve_id: &str) -> bool {
        self.done.contains(cve_id)
    }

    /// Idempotent append. A failure here is fatal for the run.
    pub fn record(&mut self, cve_id: &str) -> Result<(), KevError> {
        if self.done.contains(cve_id) {
            return Ok(());
        }

        {
            let conn = self.db.conn.lock().unwrap();
            conn.execute(
                "INSERT OR IGNORE INTO checkpoints (epoch, seq, cve_id, recorded_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![self.epoch, self.next_seq, cve_id, Utc::now().to_rfc3339()],
            )
            .map_err(|e| KevError::Persistence(format!("Failed to record checkpoint for {}: {}", cve_id, e)))?;
        }

        debug!(cve = %cve_id, seq = self.next_seq, "Checkpoint recorded");
        self.next_seq += 1;
        self.done.insert(cve_id.to_string());
        Ok(())
    }

    /// Forget ids whose records are not in `flushed`, so they are redone.
    /// Rows stay in the database. Returns the forgotten ids, sorted.
    pub fn retain_flushed(&mut self, flushed: &HashSet<String>) -> Vec<String> {
        let mut lost: Vec<String> = self.done.iter().filter(|id| !flushed.contains(*id)).cloned().collect();
        lost.sort();
        self.done.retain(|id| flushed.contains(id));
        lost
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    /// Ids of the current epoch in record order.
    pub fn recorded(&self) -> Result<Vec<String>, KevError> {
        let conn = self.db.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT cve_id FROM checkpoints WHERE epoch = ?1 ORDER BY seq",
        )?;
        let ids = stmt
            .query_map(rusqlite::params![self.epoch], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// Rows across all epochs.
    pub fn total_rows(&self) -> Result<i64, KevError> {
        let conn = self.db.conn.lock().unwrap();
        let n = conn.query_row("SELECT COUNT(*) FROM checkpoints", [], |row| row.get(0))?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_is_idempotent() {
        let mut store = CheckpointStore::open(Database::in_memory().unwrap(), true).unwrap();
        store.record("CVE-2025-0001").unwrap();
        store.record("CVE-2025-0001").unwrap();
        assert!(store.contains("CVE-2025-0001"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.total_rows().unwrap(), 1);
    }

    #[test]
    fn test_resume_sees_previous_records_in_order() {
        let db = Database::in_memory().unwrap();
        {
            let mut store = CheckpointStore::open(db.clone(), true).unwrap();
            store.record("CVE-2025-0002").unwrap();
            store.record("CVE-2025-0001").unwrap();
        }
        let store = CheckpointStore::open(db, true).unwrap();
        assert!(store.contains("CVE-2025-0001"));
        assert!(store.contains("CVE-2025-0002"));
        assert_eq!(store.recorded().unwrap(), vec!["CVE-2025-0002", "CVE-2025-0001"]);
    }

    #[test]
    fn test_fresh_run_ignores_but_keeps_prior_state() {
        let db = Database::in_memory().unwrap();
        {
            let mut store = CheckpointStore::open(db.clone(), true).unwrap();
            store.record("CVE-2025-0001").unwrap();
        }
        let mut fresh = CheckpointStore::open(db.clone(), false).unwrap();
        assert_eq!(fresh.epoch(), 2);
        assert!(!fresh.contains("CVE-2025-0001"));
        fresh.record("CVE-2025-0001").unwrap();
        // Never shrinks: both epochs keep their row
        assert_eq!(fresh.total_rows().unwrap(), 2);

        let resumed = CheckpointStore::open(db, true).unwrap();
        assert_eq!(resumed.epoch(), 2);
        assert!(resumed.contains("CVE-2025-0001"));
    }

    #[test]
    fn test_retain_flushed_masks_without_deleting() {
        let mut store = CheckpointStore::open(Database::in_memory().unwrap(), true).unwrap();
        store.record("CVE-2025-0001").unwrap();
        store.record("CVE-2025-0002").unwrap();

        let flushed: HashSet<String> = ["CVE-2025-0002".to_string()].into_iter().collect();
        assert_eq!(store.retain_flushed(&flushed), vec!["CVE-2025-0001"]);
        assert!(!store.contains("CVE-2025-0001"));
        assert!(store.contains("CVE-2025-0002"));
        assert_eq!(store.total_rows().unwrap(), 2);

        // Re-recording the forgotten id does not add a row
        store.record("CVE-2025-0001").unwrap();
        assert!(store.contains("CVE-2025-0001"));
        assert_eq!(store.total_rows().unwrap(), 2);
    }

    #[test]
    fn test_persists_to_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("out.jsonl.checkpoint.db");
        {
            let mut store = CheckpointStore::open(Database::new(&path).unwrap(), false).unwrap();
            store.record("CVE-2025-1234").unwrap();
        }
        let store = CheckpointStore::open(Database::new(&path).unwrap(), true).unwrap();
        assert!(store.contains("CVE-2025-1234"));
    }
}
