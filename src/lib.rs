//! # portrait-pipeline
//!
//! Asynchronous AI portrait-generation pipeline: reference photos plus a
//! style configuration in, professionally styled portraits out.
//!
//! ## Features
//!
//! - Generation job state machine with SQLite persistence and crash recovery
//! - Bounded rate-limit-only retry around every provider call
//! - Pre-flight asset readiness validation (all violations collected)
//! - Photo classification behind a bounded FIFO concurrency queue
//! - Per-job credit ledger: reserve up front, consume atomically on success,
//!   release on failure or delete
//! - Typed progress/completion events over a broadcast channel
//!
//! ## Quick Start
//!
//! 1. Implement [`ImageProvider`] or point [`RestProvider`] at a service
//! 2. Create a [`Pipeline`] with a [`PipelineConfig`]
//! 3. Grant credits, add reference photos, enqueue classification
//! 4. Create a job with [`Pipeline::create_job()`] and drive it with
//!    [`Pipeline::run_job()`]
//!
//! ```no_run
//! use portrait_pipeline::{
//!     MemoryBlobStore, Pipeline, PipelineConfig, RestProvider, StyleConfiguration,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> portrait_pipeline::Result<()> {
//! let provider = RestProvider::new("https://api.example.com").with_api_key("sk-...");
//! let pipeline = Pipeline::new(
//!     PipelineConfig::default(),
//!     provider,
//!     Arc::new(MemoryBlobStore::new()),
//! )?;
//!
//! pipeline.grant_credits("person-1", 5)?;
//! let photo_id = pipeline.add_reference_photo("person-1", std::fs::read("me.png").unwrap())?;
//! pipeline.enqueue_classification(&photo_id)?;
//!
//! let job_id = pipeline.create_job("person-1", "photos/input.png", StyleConfiguration::default())?;
//! let status = pipeline.run_job(&job_id, &[]).await?;
//! println!("{:?}: {:?}", status.status, status.output_keys);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod credits;
pub mod db;
pub mod error;
pub mod events;
pub mod http;
pub mod job;
pub mod pipeline;
pub mod provider;
pub mod rate_limit;
pub mod retry;
pub mod storage;
pub mod style;
pub mod validator;

pub use classify::{CapturedKind, ClassificationQueue, ClassificationStatus, QueueSnapshot};
pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use error::{PipelineError, ProviderError, Result};
pub use events::{
    EventBus, JobCompletedEvent, JobFailedEvent, JobProgressEvent, PhotoClassifiedEvent,
    PipelineEvent,
};
pub use http::RestProvider;
pub use job::{GenerationJob, JobProgress, JobStatus, JobStatusView};
pub use pipeline::Pipeline;
pub use provider::{
    Classification, GenerationOutput, GenerationRequest, ImageProvider, PhotoKind,
};
pub use rate_limit::payload_is_rate_limited;
pub use retry::{with_retry, RetryAttempt, RetryPolicy};
pub use storage::{BlobStore, MemoryBlobStore};
pub use style::{
    AssetKind, AssetMetadata, BackgroundChoice, BrandingChoice, BrandingPosition, ClothingChoice,
    PoseChoice, PreparedAsset, StyleConfiguration,
};
pub use validator::required_asset_errors;
