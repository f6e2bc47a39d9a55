use std::path::PathBuf;
use std::sync::Arc;
use chrono::NaiveDate;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use crate::cli::commands::EnrichArgs;
use crate::cli::progress::{summary_lines, EnrichProgress};
use crate::config::{ClientConfig, ToolConfig};
use crate::epss::{EpssHttpSource, ScoreClient};
use crate::errors::KevError;
use crate::kev::CatalogLoader;
use crate::models::score::SnapshotMode;
use crate::pipeline::{EnrichConfig, EnrichmentEngine, RunSummary};
use crate::utils::clock::SystemClock;
use tracing::{info, warn};

pub async fn handle_enrich(args: EnrichArgs, config: ToolConfig, quiet: bool) -> Result<(), KevError> {
    let snapshot = parse_snapshot_mode(args.asof.as_deref())?;
    let client_config = merge_client_config(&args, &config)?;
    let timeout = client_config.timeout();
    let retry = client_config.retry_config();

    info!(year = args.year, out = %args.out, resume = args.resume, snapshot = %snapshot, "Starting enrichment");

    let loader = CatalogLoader::new(
        args.kev_url.as_deref().or(config.kev_url()),
        timeout,
        config.user_agent(),
        retry.clone(),
    )?;
    let entries = loader.load(args.year).await?;

    let source = EpssHttpSource::new(
        args.epss_url.as_deref().or(config.epss_api_url()),
        timeout,
        config.user_agent(),
    )?;
    let client = ScoreClient::new(
        Arc::new(source),
        Arc::new(SystemClock),
        client_config.min_interval(),
        retry,
    );

    let mut enrich_config = EnrichConfig::new(args.year, PathBuf::from(&args.out), args.resume, snapshot);
    if let Some(checkpoint) = &args.checkpoint {
        enrich_config = enrich_config.with_checkpoint_path(PathBuf::from(checkpoint));
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        warn!(signal, "Stopping, flushed records are kept");
        signal_token.cancel();
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress_task = tokio::spawn(async move {
        let mut progress = EnrichProgress::new(quiet);
        while let Some(event) = rx.recv().await {
            progress.handle_event(&event);
        }
    });

    let summary = {
        let mut engine = EnrichmentEngine::open(enrich_config, client)
            .await?
            .with_cancel_token(cancel)
            .with_event_channel(tx);
        engine.run(&entries).await
    };
    // Engine (and its sender) is gone, so the progress task drains and exits
    let _ = progress_task.await;
    let summary = summary?;

    if !quiet {
        for line in summary_lines(&summary, &args.out) {
            println!("{}", line);
        }
    }

    finish(summary)
}

/// Resolves on Ctrl-C or, on unix, SIGTERM; returns the signal's name.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => tokio::select! {
                Ok(()) = tokio::signal::ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            },
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM, only Ctrl-C stops the run cleanly");
                ctrl_c_or_never().await
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c_or_never().await
    }
}

async fn ctrl_c_or_never() -> &'static str {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

fn finish(summary: RunSummary) -> Result<(), KevError> {
    if summary.interrupted {
        return Err(KevError::Interrupted(format!(
            "{} of {} entries left",
            summary.remaining(),
            summary.total
        )));
    }
    Ok(())
}

pub fn parse_snapshot_mode(asof: Option<&str>) -> Result<SnapshotMode, KevError> {
    match asof.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(SnapshotMode::Latest),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(SnapshotMode::AsOf)
            .map_err(|_| KevError::Config(format!("--asof must be YYYY-MM-DD, got '{}'", s))),
    }
}

/// CLI flags take precedence over the config file.
pub fn merge_client_config(args: &EnrichArgs, config: &ToolConfig) -> Result<ClientConfig, KevError> {
    if args.retries == Some(0) {
        return Err(KevError::Config("--retries must be at least 1".into()));
    }
    if args.timeout == Some(0) {
        return Err(KevError::Config("--timeout must be positive".into()));
    }

    let mut merged = config.client();
    if let Some(ms) = args.sleep_ms {
        merged.min_interval_ms = Some(ms);
    }
    if let Some(secs) = args.timeout {
        merged.timeout_secs = Some(secs);
    }
    if let Some(attempts) = args.retries {
        merged.max_attempts = Some(attempts);
    }
    Ok(merged)
}
