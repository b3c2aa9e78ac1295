use std::time::Duration;
use thiserror::Error;

/// Errors returned by generative-model providers.
///
/// This is a closed union established at the provider-client boundary so the
/// retry layer can decide retryable-vs-not with a plain match instead of
/// spelunking through nested error shapes. Providers that cannot be wrapped
/// cleanly can classify their raw payloads with
/// [`crate::rate_limit::payload_is_rate_limited`] before constructing one of
/// these variants.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The provider asked the caller to back off (HTTP 429 or equivalent).
    #[error("Provider rate limited the request")]
    RateLimited {
        /// Server-suggested wait before retrying, when one was given.
        retry_after: Option<Duration>,
    },

    /// The provider rejected or failed the request for a non-transient reason.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Network-level failure reaching the provider.
    #[error("{0}")]
    Network(String),
}

impl ProviderError {
    /// Whether this error represents a transient rate-limit condition that
    /// the retry executor is allowed to spend budget on.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ProviderError::RateLimited { .. })
    }
}

/// Errors that can occur in the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Provider call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Reference photo not found: {0}")]
    PhotoNotFound(String),

    #[error("Blob not found in storage: {0}")]
    BlobMissing(String),

    #[error("Invalid job state: {0}")]
    InvalidState(String),

    #[error("Insufficient credits for {0}")]
    InsufficientCredits(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Other(err.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_classification() {
        let err = ProviderError::RateLimited { retry_after: None };
        assert!(err.is_rate_limited());

        assert!(!ProviderError::Provider("invalid argument".into()).is_rate_limited());
        assert!(!ProviderError::Network("connection refused".into()).is_rate_limited());
    }

    #[test]
    fn test_anyhow_bridge() {
        let err: PipelineError = anyhow::anyhow!("mutex poisoned").into();
        assert_eq!(err.to_string(), "mutex poisoned");
    }
}
