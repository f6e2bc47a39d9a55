use crate::analysis::{DeceptiveLow, LatencyCurve, ThresholdResult};
use crate::utils::formatting::{format_percent, format_score};

pub fn format_threshold_table(results: &[ThresholdResult]) -> String {
    let mut out = String::from(
        "| EPSS >= | Hits | Conditional recall | Effective recall | Workload |\n|---|---|---|---|---|\n",
    );
    for r in results {
        let workload = r.workload_count.map_or_else(|| "n/a".to_string(), |w| w.to_string());
        out.push_str(&format!(
            "| {} | {}/{} | {} | {} | {} |\n",
            r.threshold,
            r.hits,
            r.scored,
            format_percent(r.conditional_recall),
            format_percent(r.effective_recall),
            workload,
        ));
    }
    out
}

pub fn format_deceptive_table(flagged: &[DeceptiveLow]) -> String {
    if flagged.is_empty() {
        return "No entries below the ceiling.\n".to_string();
    }

    let mut out = String::from(
        "| CVE | Added | EPSS at inclusion | EPSS at snapshot | Delta | Growth |\n|---|---|---|---|---|---|\n",
    );
    for d in flagged {
        let growth = d.growth_factor.map_or_else(|| "-".to_string(), |g| format!("x{:.1}", g));
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            d.cve_id,
            d.date_added,
            format_score(Some(d.epss_at_inclusion)),
            format_score(d.epss_at_snapshot),
            format_score(d.delta),
            growth,
        ));
    }
    out
}

/// `target_label` renders the curve's target, e.g. `EPSS >= 0.01`.
pub fn format_latency_table(curves: &[LatencyCurve], target_label: impl Fn(f64) -> String) -> String {
    let mut out = String::from("| Target | Reached | Censored | Median days |\n|---|---|---|---|\n");
    for c in curves {
        let median = c.median_days.map_or_else(|| "-".to_string(), |m| format!("{:.1}", m));
        out.push_str(&format!(
            "| {} | {} ({}) | {} | {} |\n",
            target_label(c.target),
            c.observed,
            format_percent(c.reached_share),
            c.censored,
            median,
        ));
    }
    out
}
