use serde::{Deserialize, Serialize};
use crate::epss::PopulationSnapshot;
use crate::models::record::EnrichedRecord;

pub const DEFAULT_THRESHOLDS: [f64; 5] = [0.001, 0.01, 0.05, 0.1, 0.5];

/// Recall and patch workload at one EPSS threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdResult {
    pub threshold: f64,
    /// Entries with a known inclusion score >= threshold.
    pub hits: usize,
    /// Entries with a known inclusion score.
    pub scored: usize,
    /// All entries, scored or not.
    pub total: usize,
    /// `hits / scored`; `None` when nothing is scored.
    pub conditional_recall: Option<f64>,
    /// `hits / total`; a missing score counts as below every threshold.
    pub effective_recall: Option<f64>,
    /// Population CVEs with score >= threshold; `None` without a snapshot.
    pub workload_count: Option<usize>,
}

/// Evaluate each threshold independently, in the order given.
pub fn analyze(
    records: &[EnrichedRecord],
    population: Option<&PopulationSnapshot>,
    thresholds: &[f64],
) -> Vec<ThresholdResult> {
    let total = records.len();
    let known: Vec<f64> = records.iter().filter_map(|r| r.epss_at_inclusion).collect();
    let scored = known.len();

    thresholds
        .iter()
        .map(|&threshold| {
            let hits = known.iter().filter(|s| **s >= threshold).count();
            ThresholdResult {
                threshold,
                hits,
                scored,
                total,
                conditional_recall: ratio(hits, scored),
                effective_recall: ratio(hits, total),
                workload_count: population.map(|p| p.count_at_or_above(threshold)),
            }
        })
        .collect()
}

fn ratio(num: usize, den: usize) -> Option<f64> {
    (den > 0).then(|| num as f64 / den as f64)
}
