use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use chrono::{NaiveDate, Weekday};
use console::style;
use crate::cli::commands::FetchSnapshotsArgs;
use crate::config::ToolConfig;
use crate::epss::{weekly_dates, FetchSummary, SnapshotDownloader};
use crate::errors::KevError;
use crate::utils::clock::SystemClock;
use tracing::info;

pub async fn handle_fetch_snapshots(args: FetchSnapshotsArgs, config: ToolConfig, quiet: bool) -> Result<(), KevError> {
    let start = parse_date("--start", &args.start)?;
    let end = parse_date("--end", &args.end)?;
    if end < start {
        return Err(KevError::Config(format!("--end {} is before --start {}", end, start)));
    }
    let weekday: Weekday = args
        .weekday
        .parse()
        .map_err(|_| KevError::Config(format!("--weekday must be a day name like mon, got '{}'", args.weekday)))?;

    let mut client_config = config.client();
    if args.retries == Some(0) {
        return Err(KevError::Config("--retries must be at least 1".into()));
    }
    if let Some(secs) = args.timeout {
        client_config.timeout_secs = Some(secs);
    }
    if let Some(attempts) = args.retries {
        client_config.max_attempts = Some(attempts);
    }

    let dates = weekly_dates(start, end, weekday);
    info!(start = %start, end = %end, weekday = %weekday, planned = dates.len(), "Planned snapshot downloads");

    let downloader = SnapshotDownloader::new(
        args.base_url.as_deref().or(config.epss_snapshot_url()),
        client_config.timeout(),
        config.user_agent(),
        client_config.retry_config(),
        Duration::from_millis(args.sleep_ms),
        Arc::new(SystemClock),
    )?;
    let summary = downloader.fetch_all(&dates, Path::new(&args.out_dir), args.force).await?;

    if !quiet {
        println!(
            "  {} downloaded {}, skipped {}, missing {}, failed {} -> {}",
            style("snapshots").bold(),
            style(summary.downloaded).green(),
            summary.skipped,
            summary.missing.len(),
            style(summary.failed.len()).red(),
            args.out_dir
        );
    }

    finish(summary)
}

/// Dates the server does not have are reported, not fatal; transfer failures are.
fn finish(summary: FetchSummary) -> Result<(), KevError> {
    if summary.failed.is_empty() {
        return Ok(());
    }
    let dates: Vec<String> = summary.failed.iter().map(NaiveDate::to_string).collect();
    Err(KevError::SourceUnavailable(format!(
        "{} of {} snapshots failed: {}",
        summary.failed.len(),
        summary.planned,
        dates.join(", ")
    )))
}

fn parse_date(flag: &str, value: &str) -> Result<NaiveDate, KevError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| KevError::Config(format!("{} must be YYYY-MM-DD, got '{}'", flag, value)))
}
