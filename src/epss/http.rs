//! FIRST EPSS API source.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::errors::KevError;
use crate::models::score::{QueryDate, ScoreObservation};
use super::source::ScoreSource;

pub const EPSS_API_URL: &str = "https://api.first.org/data/v1/epss";
pub const EPSS_API_URL_ENV: &str = "EPSS_API_URL";

#[derive(Debug, Deserialize)]
struct EpssResponse {
    #[serde(default)]
    data: Vec<EpssItem>,
}

/// The API reports numbers as strings.
#[derive(Debug, Deserialize)]
struct EpssItem {
    cve: String,
    epss: String,
    percentile: Option<String>,
    date: Option<String>,
}

pub struct EpssHttpSource {
    client: Client,
    base_url: String,
}

impl EpssHttpSource {
    /// The base URL is resolved in this order:
    /// 1. `base_url` argument if given
    /// 2. `EPSS_API_URL` environment variable if set
    /// 3. Default FIRST API URL
    pub fn new(
        base_url: Option<&str>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self, KevError> {
        let base_url = base_url
            .map(str::to_string)
            .or_else(|| env::var(EPSS_API_URL_ENV).ok())
            .unwrap_or_else(|| EPSS_API_URL.to_string());

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| KevError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ScoreSource for EpssHttpSource {
    async fn fetch(
        &self,
        cve_id: &str,
        date: QueryDate,
    ) -> Result<Option<ScoreObservation>, KevError> {
        let mut params = vec![("cve", cve_id.to_string())];
        if let QueryDate::On(d) = date {
            params.push(("date", d.format("%Y-%m-%d").to_string()));
        }

        tracing::trace!(cve = %cve_id, date = %date, url = %self.base_url, "GET EPSS");

        let resp = self.client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    KevError::Timeout(format!("EPSS request for {} timed out: {}", cve_id, e))
                } else {
                    KevError::Network(format!("EPSS request for {} failed: {}", cve_id, e))
                }
            })?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(KevError::RateLimited(format!("EPSS rate limit for {}", cve_id)));
        }
        if status.is_server_error() {
            return Err(KevError::Network(format!("EPSS HTTP {} for {}", status.as_u16(), cve_id)));
        }
        if !status.is_success() {
            return Err(KevError::InvalidResponse(format!(
                "EPSS HTTP {} for {}",
                status.as_u16(),
                cve_id
            )));
        }

        let body = resp.text().await
            .map_err(|e| KevError::Network(format!("Failed to read EPSS body for {}: {}", cve_id, e)))?;

        parse_epss_response(&body, cve_id)
    }

    fn source_name(&self) -> &str { "epss-api" }
}

/// Parse an EPSS API body for a single-CVE query and sanity-check it.
pub fn parse_epss_response(body: &str, cve_id: &str) -> Result<Option<ScoreObservation>, KevError> {
    let parsed: EpssResponse = serde_json::from_str(body)
        .map_err(|e| KevError::InvalidResponse(format!("Malformed EPSS body for {}: {}", cve_id, e)))?;

    let item = match parsed.data.into_iter().next() {
        Some(item) => item,
        None => return Ok(None),
    };

    if !item.cve.trim().eq_ignore_ascii_case(cve_id) {
        return Err(KevError::InvalidResponse(format!(
            "Unexpected CVE in response: {} (requested {})",
            item.cve, cve_id
        )));
    }

    let epss = parse_probability(&item.epss, "epss", cve_id)?;
    let percentile = item.percentile
        .as_deref()
        .map(|p| parse_probability(p, "percentile", cve_id))
        .transpose()?;
    let date = item.date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d.get(..10).unwrap_or(d), "%Y-%m-%d").ok());

    Ok(Some(ScoreObservation {
        cve_id: cve_id.to_string(),
        date,
        epss,
        percentile,
    }))
}

fn parse_probability(raw: &str, field: &str, cve_id: &str) -> Result<f64, KevError> {
    let value: f64 = raw.trim().parse()
        .map_err(|_| KevError::InvalidResponse(format!("Non-numeric {} for {}: {}", field, cve_id, raw)))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(KevError::InvalidResponse(format!(
            "Out-of-range {}={} for {}",
            field, value, cve_id
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_found() {
        let body = r#"{"status":"OK","status-code":200,"total":1,"data":[
            {"cve":"CVE-2025-24054","epss":"0.004210000","percentile":"0.612340000","date":"2025-04-17"}
        ]}"#;
        let obs = parse_epss_response(body, "CVE-2025-24054").unwrap().unwrap();
        assert_eq!(obs.epss, 0.00421);
        assert_eq!(obs.percentile, Some(0.61234));
        assert_eq!(obs.date, NaiveDate::from_ymd_opt(2025, 4, 17));
    }

    #[test]
    fn test_parse_empty_data_is_not_found() {
        let body = r#"{"status":"OK","total":0,"data":[]}"#;
        assert_eq!(parse_epss_response(body, "CVE-2025-99999").unwrap(), None);
    }

    #[test]
    fn test_parse_missing_data_is_not_found() {
        assert_eq!(parse_epss_response(r#"{"status":"OK"}"#, "CVE-2025-1").unwrap(), None);
    }

    #[test]
    fn test_parse_zero_score_is_a_score() {
        let body = r#"{"data":[{"cve":"CVE-2025-0001","epss":"0.000000000","percentile":"0.000000000","date":"2025-01-02"}]}"#;
        let obs = parse_epss_response(body, "CVE-2025-0001").unwrap().unwrap();
        assert_eq!(obs.epss, 0.0);
    }

    #[test]
    fn test_parse_cve_mismatch() {
        let body = r#"{"data":[{"cve":"CVE-2024-1111","epss":"0.1","percentile":"0.9","date":"2025-01-02"}]}"#;
        let err = parse_epss_response(body, "CVE-2025-0001").unwrap_err();
        assert!(matches!(err, KevError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_out_of_range() {
        let body = r#"{"data":[{"cve":"CVE-2025-0001","epss":"1.5","percentile":"0.9","date":"2025-01-02"}]}"#;
        assert!(matches!(
            parse_epss_response(body, "CVE-2025-0001"),
            Err(KevError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_parse_malformed_body() {
        assert!(matches!(
            parse_epss_response("<html>Bad gateway</html>", "CVE-2025-0001"),
            Err(KevError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_fetch_known_cve() {
        let source = EpssHttpSource::new(None, Duration::from_secs(30), "kev-epss-test").unwrap();
        let obs = source.fetch("CVE-2021-44228", QueryDate::Latest).await.unwrap();
        assert!(obs.is_some());
    }
}
