/// Checkpoints are never deleted. A fresh (non-resume) run bumps
/// `current_epoch`, and only rows of the current epoch gate the run.
pub const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS checkpoint_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS checkpoints (
    epoch INTEGER NOT NULL,
    seq INTEGER NOT NULL,
    cve_id TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (epoch, cve_id)
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_epoch_seq ON checkpoints(epoch, seq);
";
