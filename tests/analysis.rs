use chrono::NaiveDate;
use kev_epss::analysis::{analyze, detect};
use kev_epss::cli::analyze::build_report;
use kev_epss::epss::PopulationSnapshot;
use kev_epss::models::{CatalogEntry, EnrichedRecord, SnapshotMode};
use kev_epss::pipeline::read_dataset;
use kev_epss::reporting::write_analysis_outputs;
use std::fs;
use tempfile::TempDir;

fn record(cve: &str, added: &str, inclusion: Option<f64>, snapshot: Option<f64>) -> EnrichedRecord {
    let date_added = NaiveDate::parse_from_str(added, "%Y-%m-%d").unwrap();
    EnrichedRecord {
        entry: CatalogEntry::new(cve, date_added),
        epss_at_inclusion: inclusion,
        percentile_at_inclusion: None,
        epss_at_snapshot: snapshot,
        percentile_at_snapshot: None,
        snapshot_date: None,
        snapshot_mode: SnapshotMode::Latest,
        error_at_inclusion: None,
        error_at_snapshot: None,
    }
}

fn write_dataset(dir: &TempDir, records: &[EnrichedRecord]) -> std::path::PathBuf {
    let path = dir.path().join("kev_2025_epss.jsonl");
    let body: String = records
        .iter()
        .map(|r| serde_json::to_string(r).unwrap() + "\n")
        .collect();
    fs::write(&path, body).unwrap();
    path
}

#[tokio::test]
async fn test_recall_from_dataset_file() {
    let dir = TempDir::new().unwrap();
    let path = write_dataset(&dir, &[
        record("CVE-2025-0001", "2025-01-10", Some(0.5), Some(0.9)),
        record("CVE-2025-0002", "2025-02-11", None, Some(0.3)),
        record("CVE-2025-0003", "2025-03-12", Some(0.005), Some(0.6)),
    ]);

    let dataset = read_dataset(&path).await.unwrap();
    let results = analyze(&dataset.records, None, &[0.01]);

    assert_eq!(results[0].hits, 1);
    assert_eq!(results[0].conditional_recall, Some(0.5));
    let effective = results[0].effective_recall.unwrap();
    assert!((effective - 1.0 / 3.0).abs() < 1e-12);
    assert_eq!(results[0].workload_count, None);

    let flagged = detect(&dataset.records, 0.01);
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0].cve_id, "CVE-2025-0003");
}

#[tokio::test]
async fn test_duplicate_rows_count_once() {
    let dir = TempDir::new().unwrap();
    let path = write_dataset(&dir, &[
        record("CVE-2025-0001", "2025-01-10", None, None),
        record("CVE-2025-0002", "2025-02-11", Some(0.2), None),
        record("CVE-2025-0001", "2025-01-10", Some(0.4), None),
    ]);

    let dataset = read_dataset(&path).await.unwrap();
    let results = analyze(&dataset.records, None, &[0.1]);

    assert_eq!(results[0].total, 2);
    assert_eq!(results[0].hits, 2);
    assert_eq!(results[0].effective_recall, Some(1.0));
}

#[tokio::test]
async fn test_workload_from_population_csv() {
    let dir = TempDir::new().unwrap();
    let population_path = dir.path().join("epss_scores-2025-12-31.csv");
    fs::write(
        &population_path,
        "cve,epss,percentile\nCVE-2024-0001,0.9,0.99\nCVE-2024-0002,0.05,0.8\nCVE-2024-0003,0.001,0.1\n",
    )
    .unwrap();
    let population = PopulationSnapshot::load(&population_path).unwrap();
    assert_eq!(population.score_date, NaiveDate::from_ymd_opt(2025, 12, 31));

    let records = vec![record("CVE-2025-0001", "2025-01-10", Some(0.5), None)];
    let results = analyze(&records, Some(&population), &[0.01, 0.5]);

    assert_eq!(results[0].workload_count, Some(2));
    assert_eq!(results[1].workload_count, Some(1));
}

#[tokio::test]
async fn test_report_outputs_written() {
    let dir = TempDir::new().unwrap();
    let path = write_dataset(&dir, &[
        record("CVE-2025-0001", "2025-01-10", Some(0.5), Some(0.9)),
        record("CVE-2025-0002", "2025-02-11", None, None),
        record("CVE-2025-0003", "2025-03-12", Some(0.004), Some(0.6)),
    ]);
    let dataset = read_dataset(&path).await.unwrap();
    let report = build_report("kev_2025_epss.jsonl", dataset, None, &[0.001, 0.01, 0.1], 0.01);

    assert_eq!(report.records, 3);
    assert_eq!(report.missing_at_inclusion, 1);

    let out_dir = dir.path().join("analysis");
    write_analysis_outputs(&out_dir, &report).await.unwrap();

    let thresholds: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join("threshold_analysis.json")).unwrap()).unwrap();
    assert_eq!(thresholds.as_array().unwrap().len(), 3);
    assert_eq!(thresholds[0]["hits"], 2);

    let deceptive: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out_dir.join("deceptive_low.json")).unwrap()).unwrap();
    assert_eq!(deceptive[0]["cve_id"], "CVE-2025-0003");

    let markdown = fs::read_to_string(out_dir.join("analysis_report.md")).unwrap();
    assert!(markdown.contains("CVE-2025-0003"));
    assert!(markdown.contains("| 0.01 | 1/2 | 50.0% | 33.3% | n/a |"));

    // Rerunning replaces the outputs wholesale
    write_analysis_outputs(&out_dir, &report).await.unwrap();
    assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 3);
}
