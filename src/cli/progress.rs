use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use console::style;
use crate::pipeline::{EnrichEvent, RunSummary};
use crate::utils::formatting::format_duration;

/// Progress bar fed by enrichment engine events.
pub struct EnrichProgress {
    bar: ProgressBar,
    degraded: usize,
}

impl EnrichProgress {
    pub fn new(hidden: bool) -> Self {
        let bar = ProgressBar::new(0);
        if hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:30.cyan/dark_gray} {pos}/{len} CVEs | {elapsed_precise} | {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓░"),
        );
        Self { bar, degraded: 0 }
    }

    pub fn handle_event(&mut self, event: &EnrichEvent) {
        match event {
            EnrichEvent::Started { total, already_done } => {
                self.bar.set_length(*total as u64);
                self.bar.set_position(*already_done as u64);
                if *already_done > 0 {
                    self.println(&format!(
                        "  {} Resuming: {} of {} already recorded",
                        style("↻").cyan(),
                        already_done,
                        total
                    ));
                }
            }
            // Counted up front in `Started`
            EnrichEvent::Skipped { .. } => {}
            EnrichEvent::Recorded { cve_id, degraded } => {
                if *degraded {
                    self.degraded += 1;
                }
                self.bar.inc(1);
                self.bar.set_message(if self.degraded > 0 {
                    format!("{} ({} degraded)", cve_id, self.degraded)
                } else {
                    cve_id.clone()
                });
            }
            EnrichEvent::Finished { summary } => {
                if summary.interrupted {
                    self.bar.abandon_with_message("Interrupted");
                } else {
                    self.bar.finish_with_message("Done");
                }
            }
        }
    }

    pub fn println(&self, msg: &str) {
        self.bar.println(msg);
    }
}

/// Styled end-of-run summary lines.
pub fn summary_lines(summary: &RunSummary, output: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let headline = if summary.interrupted {
        style("Enrichment interrupted").yellow().bold().to_string()
    } else {
        style("Enrichment complete").green().bold().to_string()
    };
    lines.push(format!("{} in {}", headline, format_duration(summary.duration_ms)));
    lines.push(format!(
        "  {} processed, {} skipped, {} remaining",
        summary.processed,
        summary.skipped,
        summary.remaining()
    ));
    lines.push(format!(
        "  missing EPSS: {} at inclusion, {} at snapshot",
        summary.missing_at_inclusion, summary.missing_at_snapshot
    ));
    if summary.errors_at_inclusion + summary.errors_at_snapshot > 0 {
        lines.push(format!(
            "  {} lookups gave up after retries ({} at inclusion, {} at snapshot)",
            style(summary.errors_at_inclusion + summary.errors_at_snapshot).red(),
            summary.errors_at_inclusion,
            summary.errors_at_snapshot
        ));
    }
    lines.push(format!("  output: {}", output));
    if summary.interrupted {
        lines.push("  rerun with --resume to continue".to_string());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_tracks_events() {
        let mut progress = EnrichProgress::new(true);
        progress.handle_event(&EnrichEvent::Started { total: 3, already_done: 1 });
        progress.handle_event(&EnrichEvent::Recorded { cve_id: "CVE-2025-0002".into(), degraded: true });
        assert_eq!(progress.bar.position(), 2);
        assert_eq!(progress.degraded, 1);
    }

    #[test]
    fn test_summary_mentions_resume_when_interrupted() {
        console::set_colors_enabled(false);
        let summary = RunSummary { total: 2, processed: 1, interrupted: true, ..Default::default() };
        let lines = summary_lines(&summary, "out.jsonl");
        assert!(lines[0].starts_with("Enrichment interrupted"));
        assert!(lines.iter().any(|l| l.contains("--resume")));
        assert!(lines.iter().any(|l| l.contains("1 remaining")));
    }
}
