//! Weekly panel: the scores of catalog CVEs across a folder of daily EPSS
//! snapshots, one row per CVE and snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::KevError;
use super::population::{date_from_comment, date_from_file_name, read_snapshot_text};
use tracing::{debug, info, warn};

const SNAPSHOT_PREFIX: &str = "epss_scores-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRow {
    pub cve_id: String,
    pub date_added: NaiveDate,
    pub snapshot_date: NaiveDate,
    pub epss: f64,
    pub percentile: Option<f64>,
}

#[derive(Debug, Default)]
pub struct WeeklyPanel {
    /// Sorted by CVE, then snapshot date.
    pub rows: Vec<PanelRow>,
    pub files: usize,
    /// Files skipped because neither header nor name carried a score date.
    pub undated_files: usize,
}

impl WeeklyPanel {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn snapshot_dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.rows.iter().map(|r| r.snapshot_date).collect();
        dates.sort();
        dates.dedup();
        dates
    }
}

/// `epss_scores-*.csv` and `epss_scores-*.csv.gz` files in `dir`, oldest first.
pub fn list_snapshot_files(dir: &Path) -> Result<Vec<PathBuf>, KevError> {
    let read = std::fs::read_dir(dir)
        .map_err(|e| KevError::Config(format!("Cannot read snapshot folder {}: {}", dir.display(), e)))?;

    let mut files = Vec::new();
    for entry in read {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(SNAPSHOT_PREFIX) && (name.ends_with(".csv") || name.ends_with(".csv.gz")) {
            files.push(path);
        }
    }

    files.sort_by(|a, b| {
        (date_from_file_name(a), a.file_name()).cmp(&(date_from_file_name(b), b.file_name()))
    });
    Ok(files)
}

/// Collect the rows of every snapshot in `dir` whose CVE is in `catalog`
/// (CVE id -> date added).
pub fn extract_panel(catalog: &HashMap<String, NaiveDate>, dir: &Path) -> Result<WeeklyPanel, KevError> {
    let files = list_snapshot_files(dir)?;
    info!(dir = %dir.display(), files = files.len(), catalog = catalog.len(), "Extracting weekly panel");

    let mut panel = WeeklyPanel { files: files.len(), ..Default::default() };

    for (idx, path) in files.iter().enumerate() {
        let content = read_snapshot_text(path)?;
        let header_date = content.lines().next().and_then(date_from_comment);
        let Some(snapshot_date) = header_date.or_else(|| date_from_file_name(path)) else {
            warn!(file = %path.display(), "No score date in header or file name, skipping");
            panel.undated_files += 1;
            continue;
        };

        let before = panel.rows.len();
        panel.rows.extend(rows_for_catalog(&content, snapshot_date, catalog));
        debug!(
            position = idx + 1,
            total = files.len(),
            file = %path.display(),
            snapshot_date = %snapshot_date,
            matched = panel.rows.len() - before,
            "Snapshot scanned"
        );
    }

    panel.rows.sort_by(|a, b| (&a.cve_id, a.snapshot_date).cmp(&(&b.cve_id, b.snapshot_date)));
    // One row per CVE and date even if two files share a score date
    panel.rows.dedup_by(|later, earlier| later.cve_id == earlier.cve_id && later.snapshot_date == earlier.snapshot_date);

    info!(
        rows = panel.rows.len(),
        snapshots = panel.snapshot_dates().len(),
        undated_files = panel.undated_files,
        "Weekly panel extracted"
    );
    Ok(panel)
}

fn rows_for_catalog<'a>(
    content: &'a str,
    snapshot_date: NaiveDate,
    catalog: &'a HashMap<String, NaiveDate>,
) -> impl Iterator<Item = PanelRow> + 'a {
    content
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(move |line| {
            let mut fields = line.split(',').map(str::trim);
            let cve = fields.next()?;
            let date_added = *catalog.get(cve)?;
            let epss: f64 = fields.next()?.parse().ok()?;
            if !(0.0..=1.0).contains(&epss) {
                return None;
            }
            let percentile = fields.next().and_then(|p| p.parse().ok());
            Some(PanelRow {
                cve_id: cve.to_string(),
                date_added,
                snapshot_date,
                epss,
                percentile,
            })
        })
}
