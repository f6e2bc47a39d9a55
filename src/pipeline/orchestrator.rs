use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use crate::db::{CheckpointStore, Database};
use crate::epss::ScoreClient;
use crate::errors::KevError;
use crate::models::catalog::CatalogEntry;
use crate::models::record::EnrichedRecord;
use crate::models::score::{QueryDate, SnapshotMode};
use super::lock::RunLock;
use super::output::{flushed_ids, RecordWriter};
use super::state::*;
use tracing::{debug, info, warn};

/// Drives one enrichment run: two score lookups per catalog entry, then
/// flush, then checkpoint, strictly in catalog order.
pub struct EnrichmentEngine {
    config: EnrichConfig,
    client: ScoreClient,
    checkpoint: CheckpointStore,
    writer: RecordWriter,
    cancel_token: CancellationToken,
    event_tx: Option<mpsc::UnboundedSender<EnrichEvent>>,
    // Dropped last: released only after writer and checkpoint are closed
    _lock: RunLock,
}

impl EnrichmentEngine {
    pub async fn open(config: EnrichConfig, client: ScoreClient) -> Result<Self, KevError> {
        let lock = RunLock::acquire(&config.lock_path())?;

        let db = Database::new(&config.checkpoint_path)?;
        let mut checkpoint = CheckpointStore::open(db, config.resume)?;
        let writer = RecordWriter::open(&config.output_path, config.resume).await?;

        // Only ids present in both the checkpoint and the output count as done
        if config.resume {
            let flushed = flushed_ids(&config.output_path).await?;
            let lost = checkpoint.retain_flushed(&flushed);
            if !lost.is_empty() {
                warn!(
                    count = lost.len(),
                    first = %lost[0],
                    output = %config.output_path.display(),
                    "Checkpointed records are missing from the output and will be redone"
                );
            }
        }

        info!(
            output = %config.output_path.display(),
            checkpoint = %config.checkpoint_path.display(),
            lock = %lock.path().display(),
            resume = config.resume,
            snapshot = %config.snapshot,
            "Enrichment engine ready"
        );

        Ok(Self {
            config,
            client,
            checkpoint,
            writer,
            cancel_token: CancellationToken::new(),
            event_tx: None,
            _lock: lock,
        })
    }

    /// Replace the engine's cancel token with an external one (e.g. wired to Ctrl-C).
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Attach an event channel for streaming progress to the CLI.
    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<EnrichEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn emit(&self, event: EnrichEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    pub async fn run(&mut self, entries: &[CatalogEntry]) -> Result<RunSummary, KevError> {
        self.validate_inclusion_dates(entries)?;

        let started = Instant::now();
        let cancel = self.cancel_token.clone();
        let mut summary = RunSummary { total: entries.len(), ..Default::default() };

        let already_done = entries.iter().filter(|e| self.checkpoint.contains(&e.cve_id)).count();
        if self.config.resume {
            info!(already_done, total = entries.len(), "Resuming from checkpoint");
        }
        self.emit(EnrichEvent::Started { total: entries.len(), already_done });

        for (idx, entry) in entries.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.interrupted = true;
                break;
            }

            if self.checkpoint.contains(&entry.cve_id) {
                summary.skipped += 1;
                debug!(cve = %entry.cve_id, "Already checkpointed, skipping");
                self.emit(EnrichEvent::Skipped { cve_id: entry.cve_id.clone() });
                continue;
            }

            debug!(
                position = idx + 1,
                total = entries.len(),
                cve = %entry.cve_id,
                date_added = %entry.date_added,
                "Enriching"
            );

            // In-flight work is discarded on cancellation; the entry is redone on resume
            let record = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    summary.interrupted = true;
                    break;
                }
                record = self.enrich_one(entry) => record,
            };

            self.writer.append(&record).await?;
            self.checkpoint.record(&entry.cve_id)?;

            summary.processed += 1;
            if record.epss_at_inclusion.is_none() {
                summary.missing_at_inclusion += 1;
            }
            if record.epss_at_snapshot.is_none() {
                summary.missing_at_snapshot += 1;
            }
            if record.error_at_inclusion.is_some() {
                summary.errors_at_inclusion += 1;
            }
            if record.error_at_snapshot.is_some() {
                summary.errors_at_snapshot += 1;
            }

            let degraded = record.error_at_inclusion.is_some() || record.error_at_snapshot.is_some();
            self.emit(EnrichEvent::Recorded { cve_id: entry.cve_id.clone(), degraded });
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;

        if summary.interrupted {
            warn!(
                processed = summary.processed,
                remaining = summary.remaining(),
                "Run interrupted; flushed records are kept, rerun with --resume to continue"
            );
        }
        info!(
            total = summary.total,
            processed = summary.processed,
            skipped = summary.skipped,
            missing_at_inclusion = summary.missing_at_inclusion,
            missing_at_snapshot = summary.missing_at_snapshot,
            errors_at_inclusion = summary.errors_at_inclusion,
            errors_at_snapshot = summary.errors_at_snapshot,
            output = %self.writer.path().display(),
            "Enrichment finished"
        );

        self.emit(EnrichEvent::Finished { summary: summary.clone() });
        Ok(summary)
    }

    async fn enrich_one(&self, entry: &CatalogEntry) -> EnrichedRecord {
        let at_inclusion = self.client.query(&entry.cve_id, QueryDate::On(entry.date_added)).await;
        let at_snapshot = self.client.query(&entry.cve_id, self.config.snapshot.query_date()).await;
        EnrichedRecord::assemble(entry.clone(), at_inclusion, at_snapshot, self.config.snapshot)
    }

    /// A pinned snapshot must not predate any inclusion date.
    fn validate_inclusion_dates(&self, entries: &[CatalogEntry]) -> Result<(), KevError> {
        if let SnapshotMode::AsOf(asof) = self.config.snapshot {
            if let Some(late) = entries.iter().find(|e| e.date_added > asof) {
                return Err(KevError::Config(format!(
                    "{} was added on {}, after the snapshot date {}",
                    late.cve_id, late.date_added, asof
                )));
            }
        }
        Ok(())
    }
}
