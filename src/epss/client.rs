use std::sync::Arc;
use std::time::Duration;

use crate::errors::{with_retry, KevError, RetryConfig};
use crate::models::score::{QueryDate, ScoreLookup};
use crate::utils::clock::Clock;
use super::rate_limit::RateLimiter;
use super::source::ScoreSource;
use tracing::{debug, warn};

/// Rate-limited, retrying accessor to a score source.
///
/// `query` never fails: transport trouble that survives the retry budget is
/// reported as an absent observation carrying the error text.
pub struct ScoreClient {
    source: Arc<dyn ScoreSource>,
    clock: Arc<dyn Clock>,
    limiter: RateLimiter,
    retry: RetryConfig,
}

impl ScoreClient {
    pub fn new(
        source: Arc<dyn ScoreSource>,
        clock: Arc<dyn Clock>,
        min_interval: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            source,
            clock,
            limiter: RateLimiter::new(min_interval),
            retry,
        }
    }

    pub async fn query(&self, cve_id: &str, date: QueryDate) -> ScoreLookup {
        let limiter = &self.limiter;
        let clock = self.clock.as_ref();
        let source = self.source.as_ref();
        let operation = format!("{} {}@{}", source.source_name(), cve_id, date);

        let result = with_retry(&operation, &self.retry, clock, || async move {
            limiter.acquire(clock).await;
            source.fetch(cve_id, date).await
        })
        .await;

        match result {
            Ok(Some(observation)) => {
                debug!(cve = %cve_id, date = %date, epss = observation.epss, "Score found");
                ScoreLookup::found(observation)
            }
            Ok(None) => {
                debug!(cve = %cve_id, date = %date, "No score on record");
                ScoreLookup::not_found()
            }
            Err(e) => {
                let unavailable = KevError::ScoreUnavailable(format!("{} at {}: {}", cve_id, date, e));
                warn!(cve = %cve_id, date = %date, error = %e, "Score unavailable, recording as absent");
                ScoreLookup::failed(unavailable.to_string())
            }
        }
    }
}
