use std::path::{Path, PathBuf};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use crate::analysis::{DeceptiveLow, LatencyReport, ThresholdResult};
use crate::epss::PanelRow;
use crate::errors::KevError;
use crate::reporting::formatter::{format_deceptive_table, format_latency_table, format_threshold_table};
use crate::utils::fs::atomic_write;
use tracing::info;

pub const THRESHOLD_FILE: &str = "threshold_analysis.json";
pub const DECEPTIVE_FILE: &str = "deceptive_low.json";
pub const REPORT_FILE: &str = "analysis_report.md";
pub const LATENCY_FILE: &str = "latency.json";
pub const PANEL_FILE: &str = "weekly_panel.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub dataset: String,
    pub records: usize,
    pub duplicates: usize,
    pub missing_at_inclusion: usize,
    pub population_size: Option<usize>,
    pub population_date: Option<NaiveDate>,
    pub thresholds: Vec<ThresholdResult>,
    pub max_inclusion_score: f64,
    pub deceptive_low: Vec<DeceptiveLow>,
    /// Present when weekly snapshots were supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyReport>,
}

pub fn assemble_markdown(report: &AnalysisReport) -> String {
    let mut md = String::from("# KEV x EPSS analysis\n\n");
    md.push_str(&format!("- Dataset: `{}`\n", report.dataset));
    md.push_str(&format!("- Generated: {}\n", report.generated_at.to_rfc3339()));
    md.push_str(&format!(
        "- Records: {} ({} without an EPSS score at inclusion)\n",
        report.records, report.missing_at_inclusion
    ));
    if report.duplicates > 0 {
        md.push_str(&format!("- Duplicate rows collapsed: {}\n", report.duplicates));
    }
    match (report.population_size, report.population_date) {
        (Some(size), Some(date)) => md.push_str(&format!("- Population snapshot: {} CVEs scored on {}\n", size, date)),
        (Some(size), None) => md.push_str(&format!("- Population snapshot: {} CVEs\n", size)),
        _ => md.push_str("- Population snapshot: not supplied, workload not computed\n"),
    }

    md.push_str("\n## Recall by threshold\n\n");
    md.push_str("Conditional recall counts only CVEs that had a score when added to KEV. ");
    md.push_str("Effective recall counts every KEV entry, a missing score being a miss.\n\n");
    md.push_str(&format_threshold_table(&report.thresholds));

    md.push_str(&format!(
        "\n## Deceptively low scores (EPSS < {} at inclusion)\n\n",
        report.max_inclusion_score
    ));
    md.push_str(&format_deceptive_table(&report.deceptive_low));

    if let Some(latency) = &report.latency {
        md.push_str(&assemble_latency_section(latency));
    }
    md
}

fn assemble_latency_section(latency: &LatencyReport) -> String {
    let mut md = String::from("\n## Latency after inclusion (weekly snapshots)\n\n");
    match (latency.first_snapshot, latency.last_snapshot) {
        (Some(first), Some(last)) => md.push_str(&format!(
            "- Snapshots: {} from {} to {}\n",
            latency.snapshots, first, last
        )),
        _ => md.push_str("- Snapshots: none matched the dataset\n"),
    }
    md.push_str(&format!(
        "- CVEs with a snapshot on or after inclusion: {} ({} only seen before)\n",
        latency.cves_with_baseline, latency.cves_without_baseline
    ));
    md.push_str("- Latency is quantized to the snapshot cadence; CVEs that never reach a target are censored.\n");

    md.push_str("\n### Time to threshold\n\n");
    md.push_str(&format_latency_table(&latency.thresholds, |t| format!("EPSS >= {}", t)));

    md.push_str("\n### Growth over baseline\n\n");
    if latency.zero_baseline > 0 {
        md.push_str(&format!("{} CVEs with a zero baseline are left out.\n\n", latency.zero_baseline));
    }
    md.push_str(&format_latency_table(&latency.growth, |g| format!("baseline x{}", g)));
    md
}

/// Write panel rows as JSON Lines into `out_dir`.
pub async fn write_panel(out_dir: &Path, rows: &[PanelRow]) -> Result<PathBuf, KevError> {
    tokio::fs::create_dir_all(out_dir).await?;
    let mut body = String::new();
    for row in rows {
        body.push_str(&serde_json::to_string(row)?);
        body.push('\n');
    }
    let path = out_dir.join(PANEL_FILE);
    atomic_write(&path, &body).await?;
    Ok(path)
}

/// Write JSON and Markdown outputs into `out_dir`, replacing earlier ones.
pub async fn write_analysis_outputs(out_dir: &Path, report: &AnalysisReport) -> Result<Vec<PathBuf>, KevError> {
    tokio::fs::create_dir_all(out_dir).await?;

    let threshold_path = out_dir.join(THRESHOLD_FILE);
    atomic_write(&threshold_path, &serde_json::to_string_pretty(&report.thresholds)?).await?;

    let deceptive_path = out_dir.join(DECEPTIVE_FILE);
    atomic_write(&deceptive_path, &serde_json::to_string_pretty(&report.deceptive_low)?).await?;

    let mut written = vec![threshold_path, deceptive_path];

    if let Some(latency) = &report.latency {
        let latency_path = out_dir.join(LATENCY_FILE);
        atomic_write(&latency_path, &serde_json::to_string_pretty(latency)?).await?;
        written.push(latency_path);
    }

    let report_path = out_dir.join(REPORT_FILE);
    atomic_write(&report_path, &assemble_markdown(report)).await?;
    written.push(report_path);

    info!(dir = %out_dir.display(), files = written.len(), "Wrote analysis outputs");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> AnalysisReport {
        AnalysisReport {
            generated_at: Utc::now(),
            dataset: "kev_2025_epss.jsonl".into(),
            records: 3,
            duplicates: 0,
            missing_at_inclusion: 1,
            population_size: None,
            population_date: None,
            thresholds: vec![ThresholdResult {
                threshold: 0.01,
                hits: 1,
                scored: 2,
                total: 3,
                conditional_recall: Some(0.5),
                effective_recall: Some(1.0 / 3.0),
                workload_count: None,
            }],
            max_inclusion_score: 0.01,
            deceptive_low: vec![],
            latency: None,
        }
    }

    #[test]
    fn test_markdown_sections() {
        let md = assemble_markdown(&report());
        assert!(md.contains("## Recall by threshold"));
        assert!(md.contains("workload not computed"));
        assert!(md.contains("(1 without an EPSS score at inclusion)"));
    }

    #[tokio::test]
    async fn test_write_outputs() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = write_analysis_outputs(dir.path(), &report()).await.unwrap();
        assert_eq!(paths.len(), 3);

        let thresholds: Vec<ThresholdResult> =
            serde_json::from_str(&std::fs::read_to_string(&paths[0]).unwrap()).unwrap();
        assert_eq!(thresholds[0].hits, 1);
        assert!(std::fs::read_to_string(&paths[2]).unwrap().starts_with("# KEV x EPSS analysis"));
        assert!(!dir.path().join(LATENCY_FILE).exists());
    }

    #[tokio::test]
    async fn test_latency_section_and_file() {
        let rows = vec![PanelRow {
            cve_id: "CVE-2025-0001".into(),
            date_added: NaiveDate::from_ymd_opt(2025, 1, 8).unwrap(),
            snapshot_date: NaiveDate::from_ymd_opt(2025, 1, 13).unwrap(),
            epss: 0.02,
            percentile: Some(0.7),
        }];
        let mut report = report();
        report.latency = Some(crate::analysis::analyze_latency(&rows, &[0.01], &[10.0]));

        let md = assemble_markdown(&report);
        assert!(md.contains("### Time to threshold"));
        assert!(md.contains("| EPSS >= 0.01 | 1 (100.0%) | 0 | 5.0 |"));
        assert!(md.contains("| baseline x10 | 0 (0.0%) | 1 | - |"));

        let dir = tempfile::TempDir::new().unwrap();
        let paths = write_analysis_outputs(dir.path(), &report).await.unwrap();
        assert_eq!(paths.len(), 4);
        let latency: LatencyReport = serde_json::from_str(&std::fs::read_to_string(&paths[2]).unwrap()).unwrap();
        assert_eq!(latency.cves_with_baseline, 1);

        let panel_path = write_panel(dir.path(), &rows).await.unwrap();
        let line = std::fs::read_to_string(panel_path).unwrap();
        assert_eq!(line.lines().count(), 1);
        assert!(line.contains("\"snapshot_date\":\"2025-01-13\""));
    }
}
