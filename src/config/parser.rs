use std::path::Path;
use crate::errors::KevError;
use super::types::ToolConfig;
use tracing::warn;

const MAX_CONFIG_BYTES: u64 = 1_048_576;

pub async fn parse_config(path: &Path) -> Result<ToolConfig, KevError> {
    if !path.exists() {
        return Err(KevError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(KevError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

pub fn parse_config_str(content: &str) -> Result<ToolConfig, KevError> {
    // An empty document is a valid, empty config.
    if content.trim().is_empty() {
        return Ok(ToolConfig::default());
    }

    let config: ToolConfig = serde_yaml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Reject values that would make a run meaningless.
pub fn validate(config: &ToolConfig) -> Result<(), KevError> {
    if let Some(client) = &config.client {
        if client.max_attempts == Some(0) {
            return Err(KevError::Config("client.max_attempts must be at least 1".into()));
        }
        if client.timeout_secs == Some(0) {
            return Err(KevError::Config("client.timeout_secs must be positive".into()));
        }
        if let (Some(base), Some(max)) = (client.base_delay_ms, client.max_delay_ms) {
            if base > max {
                return Err(KevError::Config(format!(
                    "client.base_delay_ms ({}) exceeds client.max_delay_ms ({})",
                    base, max
                )));
            }
        }
    }

    if let Some(thresholds) = config.thresholds() {
        validate_thresholds(thresholds)?;
    }

    if let Some(ceiling) = config.max_inclusion_score() {
        validate_ceiling(ceiling)?;
    }

    if let Some(thresholds) = config.latency_thresholds() {
        validate_thresholds(thresholds)?;
    }

    if let Some(factors) = config.growth_factors() {
        validate_growth_factors(factors)?;
    }

    for url in [config.kev_url(), config.epss_api_url(), config.epss_snapshot_url()].into_iter().flatten() {
        if url.trim().is_empty() {
            return Err(KevError::Config("Source URLs must not be empty".into()));
        }
    }

    Ok(())
}

pub fn validate_thresholds(thresholds: &[f64]) -> Result<(), KevError> {
    if thresholds.is_empty() {
        return Err(KevError::Config("At least one threshold is required".into()));
    }
    for t in thresholds {
        if !(0.0..=1.0).contains(t) {
            return Err(KevError::Config(format!("Threshold {} is outside [0, 1]", t)));
        }
    }
    if thresholds.windows(2).any(|w| w[0] > w[1]) {
        warn!("Thresholds are not ascending; results keep the given order");
    }
    Ok(())
}

/// Growth is measured against a positive baseline, so a factor must exceed 1.
pub fn validate_growth_factors(factors: &[f64]) -> Result<(), KevError> {
    if factors.is_empty() {
        return Err(KevError::Config("At least one growth factor is required".into()));
    }
    match factors.iter().find(|g| !(g.is_finite() && **g > 1.0)) {
        Some(g) => Err(KevError::Config(format!("Growth factor {} must be greater than 1", g))),
        None => Ok(()),
    }
}

pub fn validate_ceiling(ceiling: f64) -> Result<(), KevError> {
    if ceiling > 0.0 && ceiling <= 1.0 {
        Ok(())
    } else {
        Err(KevError::Config(format!(
            "max_inclusion_score {} is outside (0, 1]",
            ceiling
        )))
    }
}
