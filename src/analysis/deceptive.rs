use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use crate::models::record::EnrichedRecord;

pub const DEFAULT_MAX_INCLUSION_SCORE: f64 = 0.01;

/// A confirmed-exploited CVE whose EPSS score was low when it was confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeceptiveLow {
    pub cve_id: String,
    pub date_added: NaiveDate,
    pub epss_at_inclusion: f64,
    pub epss_at_snapshot: Option<f64>,
    pub snapshot_date: Option<NaiveDate>,
    /// `epss_at_snapshot - epss_at_inclusion`
    pub delta: Option<f64>,
    /// `epss_at_snapshot / epss_at_inclusion`, undefined for a zero baseline.
    pub growth_factor: Option<f64>,
}

/// Entries with a known inclusion score strictly below `max_inclusion_score`,
/// ascending by that score, ties by CVE id. Unknown inclusion scores never
/// qualify.
pub fn detect(records: &[EnrichedRecord], max_inclusion_score: f64) -> Vec<DeceptiveLow> {
    let mut flagged: Vec<DeceptiveLow> = records
        .iter()
        .filter_map(|r| {
            let at_inclusion = r.epss_at_inclusion?;
            if at_inclusion >= max_inclusion_score {
                return None;
            }
            let delta = r.epss_at_snapshot.map(|s| s - at_inclusion);
            let growth_factor = r.epss_at_snapshot
                .filter(|_| at_inclusion > 0.0)
                .map(|s| s / at_inclusion);

            Some(DeceptiveLow {
                cve_id: r.cve_id().to_string(),
                date_added: r.entry.date_added,
                epss_at_inclusion: at_inclusion,
                epss_at_snapshot: r.epss_at_snapshot,
                snapshot_date: r.snapshot_date,
                delta,
                growth_factor,
            })
        })
        .collect();

    flagged.sort_by(|a, b| {
        a.epss_at_inclusion
            .total_cmp(&b.epss_at_inclusion)
            .then_with(|| a.cve_id.cmp(&b.cve_id))
    });
    flagged
}
