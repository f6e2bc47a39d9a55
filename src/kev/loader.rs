//! CISA Known Exploited Vulnerabilities catalog loader.

use std::collections::HashSet;
use std::env;
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use reqwest::Client;
use serde::Deserialize;

use crate::errors::{with_retry, KevError, RetryConfig};
use crate::models::catalog::CatalogEntry;
use crate::utils::clock::SystemClock;
use tracing::{debug, info, warn};

pub const KEV_URL: &str =
    "https://www.cisa.gov/sites/default/files/feeds/known_exploited_vulnerabilities.json";
pub const KEV_URL_ENV: &str = "KEV_URL";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KevFeed {
    #[serde(default)]
    catalog_version: Option<String>,
    vulnerabilities: Vec<KevVulnerability>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KevVulnerability {
    #[serde(rename = "cveID", default)]
    cve_id: String,
    #[serde(default)]
    date_added: String,
    #[serde(default)]
    vendor_project: String,
    #[serde(default)]
    product: String,
    #[serde(default)]
    vulnerability_name: String,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    known_ransomware_campaign_use: String,
}

/// Loads the catalog from an URL or a local JSON file.
pub struct CatalogLoader {
    client: Client,
    source: String,
    retry: RetryConfig,
}

impl CatalogLoader {
    /// The source is resolved in this order:
    /// 1. `source` argument if given
    /// 2. `KEV_URL` environment variable if set
    /// 3. CISA JSON feed
    pub fn new(
        source: Option<&str>,
        timeout: Duration,
        user_agent: &str,
        retry: RetryConfig,
    ) -> Result<Self, KevError> {
        let source = source
            .map(str::to_string)
            .or_else(|| env::var(KEV_URL_ENV).ok())
            .unwrap_or_else(|| KEV_URL.to_string());

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| KevError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, source, retry })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Fetch the whole catalog and keep entries added in `year`.
    ///
    /// Any failure is `SourceUnavailable`: without a catalog there is nothing
    /// to enrich.
    pub async fn load(&self, year: i32) -> Result<Vec<CatalogEntry>, KevError> {
        info!(source = %self.source, year, "Loading KEV catalog");

        let body = self.fetch().await.map_err(|e| match e {
            KevError::SourceUnavailable(_) => e,
            other => KevError::SourceUnavailable(format!("{}: {}", self.source, other)),
        })?;

        let entries = parse_catalog(&body, year)?;
        info!(year, entries = entries.len(), "KEV catalog loaded");
        Ok(entries)
    }

    async fn fetch(&self) -> Result<String, KevError> {
        if !is_remote(&self.source) {
            return tokio::fs::read_to_string(&self.source).await.map_err(KevError::from);
        }

        with_retry("kev-catalog", &self.retry, &SystemClock, || async move {
            let resp = self.client
                .get(&self.source)
                .send()
                .await
                .map_err(|e| KevError::Network(format!("KEV request failed: {}", e)))?;

            let status = resp.status();
            if status.as_u16() == 429 {
                return Err(KevError::RateLimited("KEV feed rate limit".into()));
            }
            if status.is_server_error() {
                return Err(KevError::Network(format!("KEV HTTP {}", status.as_u16())));
            }
            if !status.is_success() {
                return Err(KevError::SourceUnavailable(format!("KEV HTTP {}", status.as_u16())));
            }

            resp.text().await
                .map_err(|e| KevError::Network(format!("Failed to read KEV body: {}", e)))
        })
        .await
    }
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Parse the KEV JSON feed, keep entries added in `year`, sorted by
/// (date added, CVE id).
pub fn parse_catalog(body: &str, year: i32) -> Result<Vec<CatalogEntry>, KevError> {
    let feed: KevFeed = serde_json::from_str(body)
        .map_err(|e| KevError::SourceUnavailable(format!("Malformed KEV feed: {}", e)))?;

    debug!(
        catalog_version = feed.catalog_version.as_deref().unwrap_or("unknown"),
        total = feed.vulnerabilities.len(),
        "Parsed KEV feed"
    );

    let mut bad_dates = 0usize;
    let mut entries = Vec::new();

    for v in feed.vulnerabilities {
        let cve_id = v.cve_id.trim().to_ascii_uppercase();
        if cve_id.is_empty() {
            continue;
        }
        let date_added = match parse_date(&v.date_added) {
            Some(d) => d,
            None => {
                bad_dates += 1;
                continue;
            }
        };
        if date_added.year() != year {
            continue;
        }

        entries.push(CatalogEntry {
            cve_id,
            date_added,
            vendor_project: v.vendor_project.trim().to_string(),
            product: v.product.trim().to_string(),
            vulnerability_name: v.vulnerability_name.trim().to_string(),
            due_date: v.due_date.as_deref().and_then(parse_date),
            known_ransomware_campaign_use: v.known_ransomware_campaign_use.trim().to_string(),
        });
    }

    if bad_dates > 0 {
        warn!(bad_dates, "Skipped KEV entries with unparsable dateAdded");
    }

    entries.sort_by(|a, b| {
        a.date_added.cmp(&b.date_added).then_with(|| a.cve_id.cmp(&b.cve_id))
    });

    let mut seen = HashSet::new();
    entries.retain(|e| {
        let first = seen.insert(e.cve_id.clone());
        if !first {
            warn!(cve = %e.cve_id, "Duplicate KEV entry dropped");
        }
        first
    });

    if entries.is_empty() {
        return Err(KevError::SourceUnavailable(format!("No KEV entries with dateAdded in {}", year)));
    }

    Ok(entries)
}

/// Accepts `YYYY-MM-DD` or an ISO timestamp.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"{
        "title": "CISA Catalog of Known Exploited Vulnerabilities",
        "catalogVersion": "2025.10.17",
        "count": 6,
        "vulnerabilities": [
            {"cveID": "CVE-2025-3000", "vendorProject": "Acme", "product": "Router",
             "vulnerabilityName": "Acme Router Command Injection", "dateAdded": "2025-03-02",
             "dueDate": "2025-03-23", "knownRansomwareCampaignUse": "Unknown"},
            {"cveID": "CVE-2024-9999", "vendorProject": "Acme", "product": "VPN",
             "vulnerabilityName": "Old one", "dateAdded": "2024-12-30",
             "dueDate": "2025-01-20", "knownRansomwareCampaignUse": "Known"},
            {"cveID": "CVE-2025-1000", "vendorProject": "Contoso", "product": "Mail, Server",
             "vulnerabilityName": "Contoso \"Mail\" RCE", "dateAdded": "2025-01-10",
             "dueDate": "2025-01-31", "knownRansomwareCampaignUse": "Known"},
            {"cveID": "CVE-2025-0500", "vendorProject": "Contoso", "product": "Portal",
             "vulnerabilityName": "Portal SSRF", "dateAdded": "2025-03-02",
             "dueDate": "2025-03-23", "knownRansomwareCampaignUse": "Unknown"},
            {"cveID": "CVE-2025-7777", "vendorProject": "Broken", "product": "Date",
             "vulnerabilityName": "Bad date", "dateAdded": "not-a-date"},
            {"cveID": "cve-2025-1000", "vendorProject": "Contoso", "product": "Mail",
             "vulnerabilityName": "duplicate", "dateAdded": "2025-01-10"}
        ]
    }"#;

    #[test]
    fn test_filters_by_year_and_sorts() {
        let entries = parse_catalog(FEED, 2025).unwrap();
        let ids: Vec<&str> = entries.iter().map(|e| e.cve_id.as_str()).collect();
        assert_eq!(ids, vec!["CVE-2025-1000", "CVE-2025-0500", "CVE-2025-3000"]);
    }

    #[test]
    fn test_carries_descriptive_fields() {
        let entries = parse_catalog(FEED, 2025).unwrap();
        let mail = &entries[0];
        assert_eq!(mail.product, "Mail, Server");
        assert_eq!(mail.vulnerability_name, "Contoso \"Mail\" RCE");
        assert_eq!(mail.due_date, NaiveDate::from_ymd_opt(2025, 1, 31));
        assert_eq!(mail.known_ransomware_campaign_use, "Known");
    }

    #[test]
    fn test_duplicates_dropped() {
        let entries = parse_catalog(FEED, 2025).unwrap();
        assert_eq!(entries.iter().filter(|e| e.cve_id == "CVE-2025-1000").count(), 1);
        assert_eq!(entries[0].vulnerability_name, "Contoso \"Mail\" RCE");
    }

    #[test]
    fn test_empty_year_is_source_unavailable() {
        let err = parse_catalog(FEED, 2019).unwrap_err();
        assert!(matches!(err, KevError::SourceUnavailable(_)));
    }

    #[test]
    fn test_malformed_feed_is_source_unavailable() {
        let err = parse_catalog("{\"vulnerabilities\": 3}", 2025).unwrap_err();
        assert!(matches!(err, KevError::SourceUnavailable(_)));
    }

    #[test]
    fn test_parse_date_accepts_timestamp() {
        assert_eq!(parse_date("2025-01-10T00:00:00Z"), NaiveDate::from_ymd_opt(2025, 1, 10));
        assert_eq!(parse_date(" 2025-01-10 "), NaiveDate::from_ymd_opt(2025, 1, 10));
        assert_eq!(parse_date("01/10/2025"), None);
    }

    #[tokio::test]
    async fn test_load_from_local_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kev.json");
        std::fs::write(&path, FEED).unwrap();

        let loader = CatalogLoader::new(
            path.to_str(),
            Duration::from_secs(5),
            "kev-epss-test",
            RetryConfig::default(),
        ).unwrap();
        let entries = loader.load(2025).await.unwrap();
        assert_eq!(entries.len(), 3);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_source_unavailable() {
        let loader = CatalogLoader::new(
            Some("/nonexistent/kev.json"),
            Duration::from_secs(5),
            "kev-epss-test",
            RetryConfig::default(),
        ).unwrap();
        let err = loader.load(2025).await.unwrap_err();
        assert!(matches!(err, KevError::SourceUnavailable(_)));
    }
}
