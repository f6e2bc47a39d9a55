use async_trait::async_trait;
use crate::errors::KevError;
use crate::models::score::{QueryDate, ScoreObservation};

#[async_trait]
pub trait ScoreSource: Send + Sync {
    /// One request for one CVE at one date.
    ///
    /// `Ok(None)` means the service has no score for the CVE at that date.
    async fn fetch(
        &self,
        cve_id: &str,
        date: QueryDate,
    ) -> Result<Option<ScoreObservation>, KevError>;

    /// Source name for logging
    fn source_name(&self) -> &str;
}
