use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use super::catalog::CatalogEntry;
use super::score::{ScoreLookup, SnapshotMode};

/// One row of the merged dataset: a catalog entry with its EPSS score at
/// inclusion time and at the snapshot. Missing scores stay `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    pub epss_at_inclusion: Option<f64>,
    pub percentile_at_inclusion: Option<f64>,
    pub epss_at_snapshot: Option<f64>,
    pub percentile_at_snapshot: Option<f64>,
    pub snapshot_date: Option<NaiveDate>,
    pub snapshot_mode: SnapshotMode,
    #[serde(default)]
    pub error_at_inclusion: Option<String>,
    #[serde(default)]
    pub error_at_snapshot: Option<String>,
}

impl EnrichedRecord {
    pub fn assemble(
        entry: CatalogEntry,
        at_inclusion: ScoreLookup,
        at_snapshot: ScoreLookup,
        mode: SnapshotMode,
    ) -> Self {
        let snapshot_date = match mode {
            SnapshotMode::AsOf(d) => Some(d),
            SnapshotMode::Latest => at_snapshot.observation.as_ref().and_then(|o| o.date),
        };

        Self {
            entry,
            epss_at_inclusion: at_inclusion.epss(),
            percentile_at_inclusion: at_inclusion.percentile(),
            epss_at_snapshot: at_snapshot.epss(),
            percentile_at_snapshot: at_snapshot.percentile(),
            snapshot_date,
            snapshot_mode: mode,
            error_at_inclusion: at_inclusion.error,
            error_at_snapshot: at_snapshot.error,
        }
    }

    pub fn cve_id(&self) -> &str {
        &self.entry.cve_id
    }

    pub fn is_fully_absent(&self) -> bool {
        self.epss_at_inclusion.is_none() && self.epss_at_snapshot.is_none()
    }
}
