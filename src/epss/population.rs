//! Full-population EPSS snapshot (`epss_scores-YYYY-MM-DD.csv`), used to size
//! the patch queue a threshold would produce.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDate;
use flate2::read::GzDecoder;
use regex::Regex;
use crate::errors::KevError;
use tracing::{debug, info, warn};

fn score_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"score_date:(\d{4}-\d{2}-\d{2})").unwrap())
}

fn file_name_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"epss_scores-(\d{4}-\d{2}-\d{2})\.csv").unwrap())
}

/// Score date from the `#model_version:...,score_date:...` comment line.
pub fn date_from_comment(line: &str) -> Option<NaiveDate> {
    let c = score_date_re().captures(line)?;
    NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok()
}

/// Score date encoded in a snapshot file name, if any.
pub fn date_from_file_name(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let c = file_name_date_re().captures(name)?;
    NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok()
}

/// Reads a snapshot file, gunzipping it when the name ends in `.gz`.
pub fn read_snapshot_text(path: &Path) -> Result<String, KevError> {
    let unreadable =
        |e: std::io::Error| KevError::Config(format!("Cannot read population snapshot {}: {}", path.display(), e));

    let file = std::fs::File::open(path).map_err(unreadable)?;
    let mut content = String::new();
    if path.extension().is_some_and(|ext| ext == "gz") {
        GzDecoder::new(file).read_to_string(&mut content).map_err(unreadable)?;
    } else {
        std::io::BufReader::new(file).read_to_string(&mut content).map_err(unreadable)?;
    }
    Ok(content)
}

#[derive(Debug, Clone)]
pub struct PopulationSnapshot {
    pub score_date: Option<NaiveDate>,
    pub model_version: Option<String>,
    /// Ascending, one per distinct CVE.
    scores: Vec<f64>,
}

impl PopulationSnapshot {
    pub fn from_scores(score_date: Option<NaiveDate>, mut scores: Vec<f64>) -> Self {
        scores.sort_by(|a, b| a.total_cmp(b));
        Self { score_date, model_version: None, scores }
    }

    pub fn load(path: &Path) -> Result<Self, KevError> {
        let content = read_snapshot_text(path)?;
        let mut snapshot = Self::parse(&content)?;

        if snapshot.score_date.is_none() {
            snapshot.score_date = date_from_file_name(path);
        }

        info!(
            path = %path.display(),
            cves = snapshot.len(),
            score_date = ?snapshot.score_date,
            "Loaded population snapshot"
        );
        Ok(snapshot)
    }

    pub fn parse(content: &str) -> Result<Self, KevError> {
        let mut score_date = None;
        let mut model_version = None;
        let mut seen = HashSet::new();
        let mut scores = Vec::new();
        let mut skipped = 0usize;

        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                if let Some(d) = date_from_comment(comment) {
                    score_date = Some(d);
                }
                model_version = comment
                    .split(',')
                    .find_map(|kv| kv.trim().strip_prefix("model_version:"))
                    .map(str::to_string)
                    .or(model_version);
                continue;
            }
            if line.to_ascii_lowercase().starts_with("cve,") {
                continue;
            }

            let mut fields = line.split(',');
            let (cve, epss) = match (fields.next(), fields.next()) {
                (Some(c), Some(e)) => (c.trim(), e.trim()),
                _ => {
                    skipped += 1;
                    continue;
                }
            };
            let epss: f64 = match epss.parse() {
                Ok(v) => v,
                Err(_) => {
                    skipped += 1;
                    continue;
                }
            };
            if !(0.0..=1.0).contains(&epss) {
                return Err(KevError::Config(format!(
                    "Out-of-range score {} for {} on line {}",
                    epss,
                    cve,
                    idx + 1
                )));
            }
            if seen.insert(cve.to_string()) {
                scores.push(epss);
            }
        }

        if skipped > 0 {
            warn!(skipped, "Skipped unparsable population rows");
        }
        if scores.is_empty() {
            return Err(KevError::Config("Population snapshot contains no scores".into()));
        }
        debug!(cves = scores.len(), "Parsed population snapshot");

        let mut snapshot = Self::from_scores(score_date, scores);
        snapshot.model_version = model_version;
        Ok(snapshot)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Number of CVEs with score >= `threshold`.
    pub fn count_at_or_above(&self, threshold: f64) -> usize {
        let below = self.scores.partition_point(|s| *s < threshold);
        self.scores.len() - below
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
#model_version:v2025.03.14,score_date:2025-10-19T12:55:00+0000
cve,epss,percentile
CVE-1999-0001,0.01000,0.80000
CVE-1999-0002,0.00000,0.00100
CVE-2024-0001,0.50000,0.99000
CVE-2024-0001,0.90000,0.99900
CVE-2025-0001,0.00500,0.60000
";

    #[test]
    fn test_parse_header_and_rows() {
        let snap = PopulationSnapshot::parse(SAMPLE).unwrap();
        assert_eq!(snap.score_date, NaiveDate::from_ymd_opt(2025, 10, 19));
        assert_eq!(snap.model_version.as_deref(), Some("v2025.03.14"));
        // Duplicate CVE counted once
        assert_eq!(snap.len(), 4);
    }

    #[test]
    fn test_count_at_or_above_is_inclusive() {
        let snap = PopulationSnapshot::parse(SAMPLE).unwrap();
        assert_eq!(snap.count_at_or_above(0.01), 2);
        assert_eq!(snap.count_at_or_above(0.0), 4);
        assert_eq!(snap.count_at_or_above(0.5), 1);
        assert_eq!(snap.count_at_or_above(0.51), 0);
    }

    #[test]
    fn test_parse_without_comment_line() {
        let snap = PopulationSnapshot::parse("cve,epss,percentile\nCVE-2025-1,0.2,0.9\n").unwrap();
        assert_eq!(snap.score_date, None);
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!(PopulationSnapshot::parse("cve,epss,percentile\nCVE-2025-1,1.2,0.9\n").is_err());
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(PopulationSnapshot::parse("cve,epss,percentile\n").is_err());
    }

    #[test]
    fn test_load_falls_back_to_file_name_date() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("epss_scores-2025-06-02.csv");
        std::fs::write(&path, "cve,epss,percentile\nCVE-2025-1,0.2,0.9\n").unwrap();
        let snap = PopulationSnapshot::load(&path).unwrap();
        assert_eq!(snap.score_date, NaiveDate::from_ymd_opt(2025, 6, 2));
    }

    #[test]
    fn test_load_gzip_snapshot() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("epss_scores-2025-06-02.csv.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(SAMPLE.as_bytes()).unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let snap = PopulationSnapshot::load(&path).unwrap();
        assert_eq!(snap.len(), 4);
        // Header date wins over the file name
        assert_eq!(snap.score_date, NaiveDate::from_ymd_opt(2025, 10, 19));
        assert_eq!(snap.count_at_or_above(0.01), 2);
    }

    #[test]
    fn test_load_corrupt_gzip_is_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("epss_scores-2025-06-02.csv.gz");
        std::fs::write(&path, "cve,epss,percentile\n").unwrap();
        let err = PopulationSnapshot::load(&path).unwrap_err();
        assert!(matches!(err, KevError::Config(_)));
    }

    #[test]
    fn test_date_from_file_name() {
        assert_eq!(
            date_from_file_name(Path::new("/tmp/epss_scores-2025-01-06.csv.gz")),
            NaiveDate::from_ymd_opt(2025, 1, 6)
        );
        assert_eq!(date_from_file_name(Path::new("scores.csv")), None);
    }
}
