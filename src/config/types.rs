use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::errors::RetryConfig;

pub const DEFAULT_USER_AGENT: &str = concat!("kev-epss/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 150;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ToolConfig {
    pub sources: Option<SourcesConfig>,
    pub client: Option<ClientConfig>,
    pub analysis: Option<AnalysisConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SourcesConfig {
    pub kev_url: Option<String>,
    pub epss_api_url: Option<String>,
    /// Directory URL serving `epss_scores-YYYY-MM-DD.csv.gz`.
    pub epss_snapshot_url: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ClientConfig {
    pub min_interval_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub base_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AnalysisConfig {
    pub thresholds: Option<Vec<f64>>,
    pub max_inclusion_score: Option<f64>,
    pub latency_thresholds: Option<Vec<f64>>,
    pub growth_factors: Option<Vec<f64>>,
}

impl ToolConfig {
    pub fn kev_url(&self) -> Option<&str> {
        self.sources.as_ref().and_then(|s| s.kev_url.as_deref())
    }

    pub fn epss_api_url(&self) -> Option<&str> {
        self.sources.as_ref().and_then(|s| s.epss_api_url.as_deref())
    }

    pub fn epss_snapshot_url(&self) -> Option<&str> {
        self.sources.as_ref().and_then(|s| s.epss_snapshot_url.as_deref())
    }

    pub fn user_agent(&self) -> &str {
        self.sources
            .as_ref()
            .and_then(|s| s.user_agent.as_deref())
            .unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn client(&self) -> ClientConfig {
        self.client.clone().unwrap_or_default()
    }

    pub fn thresholds(&self) -> Option<&[f64]> {
        self.analysis.as_ref().and_then(|a| a.thresholds.as_deref())
    }

    pub fn max_inclusion_score(&self) -> Option<f64> {
        self.analysis.as_ref().and_then(|a| a.max_inclusion_score)
    }

    pub fn latency_thresholds(&self) -> Option<&[f64]> {
        self.analysis.as_ref().and_then(|a| a.latency_thresholds.as_deref())
    }

    pub fn growth_factors(&self) -> Option<&[f64]> {
        self.analysis.as_ref().and_then(|a| a.growth_factors.as_deref())
    }
}

impl ClientConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms.unwrap_or(DEFAULT_MIN_INTERVAL_MS))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Retry policy with unset fields falling back to the defaults.
    pub fn retry_config(&self) -> RetryConfig {
        let defaults = RetryConfig::default();
        RetryConfig {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            base_delay: self.base_delay_ms.map(Duration::from_millis).unwrap_or(defaults.base_delay),
            max_delay: self.max_delay_ms.map(Duration::from_millis).unwrap_or(defaults.max_delay),
            jitter: defaults.jitter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_defaults() {
        let client = ToolConfig::default().client();
        assert_eq!(client.min_interval(), Duration::from_millis(150));
        assert_eq!(client.timeout(), Duration::from_secs(60));
        assert_eq!(client.retry_config().max_attempts, 6);
    }

    #[test]
    fn test_partial_client_overrides() {
        let client = ClientConfig {
            max_attempts: Some(3),
            base_delay_ms: Some(200),
            ..Default::default()
        };
        let retry = client.retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay, Duration::from_millis(200));
        assert_eq!(retry.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_user_agent_default() {
        assert!(ToolConfig::default().user_agent().starts_with("kev-epss/"));
    }
}
