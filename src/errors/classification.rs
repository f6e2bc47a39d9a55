use super::types::KevError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
}

impl KevError {
    /// Classify this error to determine its type and whether it can be retried.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // Transient upstream conditions
            KevError::RateLimited(_) => ErrorClassification {
                error_type: "RateLimitError",
                retryable: true,
            },
            KevError::Network(_) => ErrorClassification {
                error_type: "NetworkError",
                retryable: true,
            },
            KevError::Timeout(_) => ErrorClassification {
                error_type: "TimeoutError",
                retryable: true,
            },

            // A malformed answer does not get better by asking again
            KevError::InvalidResponse(_) => ErrorClassification {
                error_type: "InvalidResponseError",
                retryable: false,
            },
            KevError::ScoreUnavailable(_) => ErrorClassification {
                error_type: "ScoreUnavailableError",
                retryable: false,
            },
            KevError::SourceUnavailable(_) => ErrorClassification {
                error_type: "SourceUnavailableError",
                retryable: false,
            },
            KevError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                retryable: false,
            },
            KevError::Persistence(_) => ErrorClassification {
                error_type: "PersistenceError",
                retryable: false,
            },
            KevError::Database(_) => ErrorClassification {
                error_type: "DatabaseError",
                retryable: false,
            },
            KevError::Locked(_) => ErrorClassification {
                error_type: "LockedError",
                retryable: false,
            },
            KevError::Interrupted(_) => ErrorClassification {
                error_type: "InterruptedError",
                retryable: false,
            },
            KevError::Io(_) => ErrorClassification {
                error_type: "IoError",
                retryable: false,
            },
            KevError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                retryable: false,
            },
            KevError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                retryable: false,
            },
            KevError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                retryable: false,
            },
        }
    }
}
