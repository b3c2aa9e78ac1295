use crate::retry::RetryPolicy;
use std::path::PathBuf;

/// Default classification slots running at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Default ceiling on classification runs per photo (initial + sweeps).
pub const DEFAULT_MAX_CLASSIFICATION_ATTEMPTS: u32 = 3;

/// Configuration for the pipeline.
///
/// Use [`PipelineConfig::builder()`] for ergonomic construction, or
/// [`PipelineConfig::default()`] for sensible defaults (in-memory DB,
/// 3 retries at 60 s, 3 classification slots).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Path to the SQLite database file. `None` = in-memory database.
    pub db_path: Option<PathBuf>,

    /// Retry policy used for every provider call.
    pub retry: RetryPolicy,

    /// Classification worker slots; caps concurrent provider classify calls.
    pub max_concurrent: usize,

    /// Hard cap on classification runs per photo, enforced by the sweep.
    pub max_classification_attempts: u32,

    /// Credits reserved (and consumed on success) per generation job.
    pub credit_cost: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            retry: RetryPolicy::default(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_classification_attempts: DEFAULT_MAX_CLASSIFICATION_ATTEMPTS,
            credit_cost: 1,
        }
    }
}

impl PipelineConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// Set the SQLite database path for persistence. Omit for in-memory.
    pub fn with_db_path(mut self, path: PathBuf) -> Self {
        self.config.db_path = Some(path);
        self
    }

    /// Override the provider retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Set the number of concurrent classification slots.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.config.max_concurrent = max;
        self
    }

    /// Set the ceiling on classification runs per photo.
    pub fn with_max_classification_attempts(mut self, max: u32) -> Self {
        self.config.max_classification_attempts = max;
        self
    }

    /// Set the credit cost per generation job.
    pub fn with_credit_cost(mut self, cost: i64) -> Self {
        self.config.credit_cost = cost;
        self
    }

    /// Build the final [`PipelineConfig`].
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}
