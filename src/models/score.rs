use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One EPSS reading for one CVE at one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreObservation {
    pub cve_id: String,
    /// Score date reported by the service.
    pub date: Option<NaiveDate>,
    pub epss: f64,
    pub percentile: Option<f64>,
}

/// Outcome of one client query.
///
/// `observation == None` with no error means the service has no record for
/// the CVE at that date. With an error it means the lookup itself failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreLookup {
    pub observation: Option<ScoreObservation>,
    pub error: Option<String>,
}

impl ScoreLookup {
    pub fn found(observation: ScoreObservation) -> Self {
        Self { observation: Some(observation), error: None }
    }

    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { observation: None, error: Some(error.into()) }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }

    pub fn epss(&self) -> Option<f64> {
        self.observation.as_ref().map(|o| o.epss)
    }

    pub fn percentile(&self) -> Option<f64> {
        self.observation.as_ref().and_then(|o| o.percentile)
    }
}

/// Point in time a score is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryDate {
    On(NaiveDate),
    /// The service's most recent score; no date parameter is sent.
    Latest,
}

impl std::fmt::Display for QueryDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::On(d) => write!(f, "{}", d),
            Self::Latest => write!(f, "latest"),
        }
    }
}

/// How the "snapshot" score of a run is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SnapshotMode {
    Latest,
    AsOf(NaiveDate),
}

impl SnapshotMode {
    pub fn query_date(&self) -> QueryDate {
        match self {
            Self::Latest => QueryDate::Latest,
            Self::AsOf(d) => QueryDate::On(*d),
        }
    }
}

impl std::fmt::Display for SnapshotMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Latest => write!(f, "latest"),
            Self::AsOf(d) => write!(f, "asof:{}", d),
        }
    }
}

impl From<SnapshotMode> for String {
    fn from(mode: SnapshotMode) -> Self {
        mode.to_string()
    }
}

impl TryFrom<String> for SnapshotMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "latest" {
            return Ok(Self::Latest);
        }
        let date = value
            .strip_prefix("asof:")
            .ok_or_else(|| format!("unknown snapshot mode: {}", value))?;
        NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map(Self::AsOf)
            .map_err(|e| format!("invalid snapshot date '{}': {}", date, e))
    }
}
