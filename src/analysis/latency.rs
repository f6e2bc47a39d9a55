//! Time from catalog inclusion until the weekly EPSS series crosses a
//! threshold, or grows by a factor over its baseline.
//!
//! The baseline of a CVE is its first snapshot on or after the date it was
//! added, so latencies are quantized to the snapshot cadence. A CVE whose
//! series never reaches the target is right-censored and contributes to the
//! `censored` count only.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::epss::panel::PanelRow;

pub const DEFAULT_LATENCY_THRESHOLDS: [f64; 3] = [0.001, 0.01, 0.1];
pub const DEFAULT_GROWTH_FACTORS: [f64; 2] = [10.0, 100.0];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EcdfPoint {
    pub days: i64,
    /// Share of observed latencies at or below `days`.
    pub share: f64,
}

/// Latency distribution for one target (a threshold or a growth factor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyCurve {
    pub target: f64,
    pub observed: usize,
    pub censored: usize,
    /// `observed / (observed + censored)`, `None` without any CVE.
    pub reached_share: Option<f64>,
    pub median_days: Option<f64>,
    pub ecdf: Vec<EcdfPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyReport {
    pub snapshots: usize,
    pub first_snapshot: Option<NaiveDate>,
    pub last_snapshot: Option<NaiveDate>,
    /// CVEs with at least one snapshot on or after their inclusion date.
    pub cves_with_baseline: usize,
    /// CVEs present in the panel only before their inclusion date.
    pub cves_without_baseline: usize,
    /// Baseline of exactly zero: growth is undefined, so these are left out
    /// of the growth curves.
    pub zero_baseline: usize,
    pub thresholds: Vec<LatencyCurve>,
    pub growth: Vec<LatencyCurve>,
}

pub fn analyze_latency(rows: &[PanelRow], thresholds: &[f64], growth_factors: &[f64]) -> LatencyReport {
    let mut series: BTreeMap<&str, Vec<&PanelRow>> = BTreeMap::new();
    for row in rows {
        series.entry(row.cve_id.as_str()).or_default().push(row);
    }

    let mut snapshot_dates: Vec<NaiveDate> = rows.iter().map(|r| r.snapshot_date).collect();
    snapshot_dates.sort();
    snapshot_dates.dedup();

    let mut threshold_days: Vec<Vec<Option<i64>>> = vec![Vec::new(); thresholds.len()];
    let mut growth_days: Vec<Vec<Option<i64>>> = vec![Vec::new(); growth_factors.len()];
    let mut with_baseline = 0;
    let mut without_baseline = 0;
    let mut zero_baseline = 0;

    for points in series.values_mut() {
        points.sort_by_key(|r| r.snapshot_date);
        let date_added = points[0].date_added;
        let after: Vec<&PanelRow> = points.iter().copied().filter(|r| r.snapshot_date >= date_added).collect();

        let Some(baseline) = after.first() else {
            without_baseline += 1;
            continue;
        };
        with_baseline += 1;

        for (days, &t) in threshold_days.iter_mut().zip(thresholds) {
            days.push(first_reaching(&after, t, date_added));
        }

        if baseline.epss <= 0.0 {
            zero_baseline += 1;
            continue;
        }
        for (days, &g) in growth_days.iter_mut().zip(growth_factors) {
            days.push(first_reaching(&after, baseline.epss * g, date_added));
        }
    }

    LatencyReport {
        snapshots: snapshot_dates.len(),
        first_snapshot: snapshot_dates.first().copied(),
        last_snapshot: snapshot_dates.last().copied(),
        cves_with_baseline: with_baseline,
        cves_without_baseline: without_baseline,
        zero_baseline,
        thresholds: thresholds.iter().zip(threshold_days).map(|(&t, d)| curve(t, d)).collect(),
        growth: growth_factors.iter().zip(growth_days).map(|(&g, d)| curve(g, d)).collect(),
    }
}

fn first_reaching(series: &[&PanelRow], target: f64, date_added: NaiveDate) -> Option<i64> {
    series
        .iter()
        .find(|r| r.epss >= target)
        .map(|r| (r.snapshot_date - date_added).num_days())
}

fn curve(target: f64, outcomes: Vec<Option<i64>>) -> LatencyCurve {
    let censored = outcomes.iter().filter(|o| o.is_none()).count();
    let mut days: Vec<i64> = outcomes.into_iter().flatten().collect();
    days.sort_unstable();

    let total = days.len() + censored;
    LatencyCurve {
        target,
        observed: days.len(),
        censored,
        reached_share: (total > 0).then(|| days.len() as f64 / total as f64),
        median_days: median(&days),
        ecdf: ecdf(&days),
    }
}

fn median(sorted: &[i64]) -> Option<f64> {
    let n = sorted.len();
    match n {
        0 => None,
        _ if n % 2 == 1 => Some(sorted[n / 2] as f64),
        _ => Some((sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0),
    }
}

/// One point per distinct latency, carrying the cumulative share up to it.
pub fn ecdf(sorted: &[i64]) -> Vec<EcdfPoint> {
    let n = sorted.len() as f64;
    let mut points: Vec<EcdfPoint> = Vec::new();
    for (i, &days) in sorted.iter().enumerate() {
        let share = (i + 1) as f64 / n;
        match points.last_mut() {
            Some(last) if last.days == days => last.share = share,
            _ => points.push(EcdfPoint { days, share }),
        }
    }
    points
}
