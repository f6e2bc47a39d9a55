//! Fetches daily EPSS population snapshots (`epss_scores-YYYY-MM-DD.csv.gz`)
//! for one weekday per week.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, Weekday};
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::errors::{with_retry, KevError, RetryConfig};
use crate::utils::clock::Clock;
use crate::utils::fs::sibling_path;
use tracing::{debug, info, warn};

pub const EPSS_SNAPSHOT_URL: &str = "https://epss.empiricalsecurity.com";
pub const EPSS_SNAPSHOT_URL_ENV: &str = "EPSS_SNAPSHOT_URL";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn snapshot_file_name(date: NaiveDate) -> String {
    format!("epss_scores-{}.csv.gz", date.format("%Y-%m-%d"))
}

/// Every `weekday` in `[start, end]`.
pub fn weekly_dates(start: NaiveDate, end: NaiveDate, weekday: Weekday) -> Vec<NaiveDate> {
    let offset = (7 + weekday.num_days_from_monday() - start.weekday().num_days_from_monday()) % 7;
    let mut dates = Vec::new();
    let mut current = start + chrono::Duration::days(offset as i64);
    while current <= end {
        dates.push(current);
        current += chrono::Duration::days(7);
    }
    dates
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded { bytes: u64 },
    /// Already on disk and `force` was off.
    Skipped,
    /// The server has no snapshot for that day.
    Missing,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchSummary {
    pub planned: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub missing: Vec<NaiveDate>,
    pub failed: Vec<NaiveDate>,
}

pub struct SnapshotDownloader {
    client: Client,
    base_url: String,
    retry: RetryConfig,
    pause: Duration,
    clock: Arc<dyn Clock>,
}

impl SnapshotDownloader {
    /// The base URL is resolved in this order:
    /// 1. `base_url` argument if given
    /// 2. `EPSS_SNAPSHOT_URL` environment variable if set
    /// 3. Default EPSS data host
    pub fn new(
        base_url: Option<&str>,
        timeout: Duration,
        user_agent: &str,
        retry: RetryConfig,
        pause: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, KevError> {
        let base_url = base_url
            .map(str::to_string)
            .or_else(|| env::var(EPSS_SNAPSHOT_URL_ENV).ok())
            .unwrap_or_else(|| EPSS_SNAPSHOT_URL.to_string());

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| KevError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url, retry, pause, clock })
    }

    pub fn url_for(&self, date: NaiveDate) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), snapshot_file_name(date))
    }

    /// Download each date into `out_dir`, pausing between requests. A failed
    /// date is recorded and the rest still run.
    pub async fn fetch_all(&self, dates: &[NaiveDate], out_dir: &Path, force: bool) -> Result<FetchSummary, KevError> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .map_err(|e| KevError::Persistence(format!("{}: {}", out_dir.display(), e)))?;

        let mut summary = FetchSummary { planned: dates.len(), ..Default::default() };
        info!(planned = dates.len(), out_dir = %out_dir.display(), base_url = %self.base_url, "Fetching EPSS snapshots");

        for (idx, &date) in dates.iter().enumerate() {
            let dest = out_dir.join(snapshot_file_name(date));
            match self.fetch_one(date, &dest, force).await {
                Ok(FetchOutcome::Downloaded { bytes }) => {
                    info!(position = idx + 1, total = dates.len(), date = %date, bytes, "Snapshot downloaded");
                    summary.downloaded += 1;
                }
                Ok(FetchOutcome::Skipped) => {
                    debug!(date = %date, "Snapshot already present");
                    summary.skipped += 1;
                    continue;
                }
                Ok(FetchOutcome::Missing) => {
                    warn!(date = %date, "No snapshot published for this date");
                    summary.missing.push(date);
                }
                Err(e) => {
                    warn!(date = %date, error = %e, "Snapshot download failed");
                    summary.failed.push(date);
                }
            }

            if idx + 1 < dates.len() {
                self.clock.sleep(self.pause).await;
            }
        }

        info!(
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            missing = summary.missing.len(),
            failed = summary.failed.len(),
            "Snapshot fetch finished"
        );
        Ok(summary)
    }

    pub async fn fetch_one(&self, date: NaiveDate, dest: &Path, force: bool) -> Result<FetchOutcome, KevError> {
        if !force && tokio::fs::try_exists(dest).await.unwrap_or(false) {
            return Ok(FetchOutcome::Skipped);
        }

        let url = self.url_for(date);
        let operation = format!("epss-snapshot {}", date);
        let client = &self.client;
        let url_ref = url.as_str();

        let body = with_retry(&operation, &self.retry, self.clock.as_ref(), || async move {
            tracing::trace!(url = %url_ref, "GET EPSS snapshot");
            let resp = client
                .get(url_ref)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        KevError::Timeout(format!("{} timed out: {}", url_ref, e))
                    } else {
                        KevError::Network(format!("{} failed: {}", url_ref, e))
                    }
                })?;

            let status = resp.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(KevError::RateLimited(format!("Snapshot rate limit for {}", url_ref)));
            }
            if status.is_server_error() {
                return Err(KevError::Network(format!("HTTP {} for {}", status.as_u16(), url_ref)));
            }
            if !status.is_success() {
                return Err(KevError::InvalidResponse(format!("HTTP {} for {}", status.as_u16(), url_ref)));
            }

            let bytes = resp
                .bytes()
                .await
                .map_err(|e| KevError::Network(format!("Failed to read {}: {}", url_ref, e)))?;
            Ok(Some(bytes))
        })
        .await?;

        let Some(body) = body else {
            return Ok(FetchOutcome::Missing);
        };
        if !body.starts_with(&GZIP_MAGIC) {
            return Err(KevError::InvalidResponse(format!("{} is not gzip data", url)));
        }

        write_replacing(dest, &body).await?;
        Ok(FetchOutcome::Downloaded { bytes: body.len() as u64 })
    }
}

/// Write to `<dest>.part`, sync, then rename over `dest`.
async fn write_replacing(dest: &Path, body: &[u8]) -> Result<(), KevError> {
    let part: PathBuf = sibling_path(dest, ".part");
    let persistence = |e: std::io::Error| KevError::Persistence(format!("{}: {}", dest.display(), e));

    let written = async {
        let mut file = tokio::fs::File::create(&part).await?;
        tokio::io::AsyncWriteExt::write_all(&mut file, body).await?;
        file.sync_all().await?;
        tokio::fs::rename(&part, dest).await
    }
    .await;

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(persistence(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::FakeClock;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_weekly_dates_start_on_requested_weekday() {
        // 2025-01-01 is a Wednesday
        let mondays = weekly_dates(d("2025-01-01"), d("2025-01-31"), Weekday::Mon);
        assert_eq!(mondays, vec![d("2025-01-06"), d("2025-01-13"), d("2025-01-20"), d("2025-01-27")]);

        let wednesdays = weekly_dates(d("2025-01-01"), d("2025-01-15"), Weekday::Wed);
        assert_eq!(wednesdays, vec![d("2025-01-01"), d("2025-01-08"), d("2025-01-15")]);

        assert!(weekly_dates(d("2025-01-07"), d("2025-01-12"), Weekday::Mon).is_empty());
    }

    #[test]
    fn test_url_for_date() {
        let downloader = SnapshotDownloader::new(
            Some("https://mirror.local/epss/"),
            Duration::from_secs(5),
            "test",
            RetryConfig::default(),
            Duration::ZERO,
            Arc::new(FakeClock::new()),
        )
        .unwrap();
        assert_eq!(
            downloader.url_for(d("2025-03-03")),
            "https://mirror.local/epss/epss_scores-2025-03-03.csv.gz"
        );
    }

    #[tokio::test]
    async fn test_existing_file_is_skipped_without_request() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join(snapshot_file_name(d("2025-03-03")));
        std::fs::write(&dest, b"kept").unwrap();

        // Unroutable base URL: any request would fail
        let downloader = SnapshotDownloader::new(
            Some("http://127.0.0.1:9"),
            Duration::from_secs(1),
            "test",
            RetryConfig { max_attempts: 1, ..RetryConfig::default() },
            Duration::ZERO,
            Arc::new(FakeClock::new()),
        )
        .unwrap();

        let outcome = downloader.fetch_one(d("2025-03-03"), &dest, false).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Skipped);
        assert_eq!(std::fs::read(&dest).unwrap(), b"kept");
    }
}
