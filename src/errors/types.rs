use thiserror::Error;

#[derive(Debug, Error)]
pub enum KevError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The catalog could not be retrieved at all. Fatal before enrichment.
    #[error("Catalog source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single score lookup failed after retries.
    #[error("Score unavailable: {0}")]
    ScoreUnavailable(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Flush or checkpoint write failed. Fatal.
    #[error("Persistence failure: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Output is locked by another run: {0}")]
    Locked(String),

    #[error("Interrupted: {0}")]
    Interrupted(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for KevError {
    fn from(e: rusqlite::Error) -> Self {
        KevError::Database(e.to_string())
    }
}

impl KevError {
    pub fn exit_code(&self) -> i32 {
        match self {
            KevError::Config(_) | KevError::Yaml(_) => 2,
            KevError::SourceUnavailable(_) => 3,
            KevError::Persistence(_) | KevError::Database(_) => 4,
            KevError::Locked(_) => 5,
            KevError::Interrupted(_) => 130,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(KevError::Config("x".into()).exit_code(), 2);
        assert_eq!(KevError::SourceUnavailable("x".into()).exit_code(), 3);
        assert_eq!(KevError::Persistence("x".into()).exit_code(), 4);
        assert_eq!(KevError::Locked("x".into()).exit_code(), 5);
        assert_eq!(KevError::Interrupted("x".into()).exit_code(), 130);
        assert_eq!(KevError::Network("x".into()).exit_code(), 1);
    }

    #[test]
    fn test_sqlite_error_maps_to_database() {
        let err: KevError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, KevError::Database(_)));
    }
}
