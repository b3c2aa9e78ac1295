//! Pipeline events for polling-free observers.
//!
//! Delivery is best-effort over a broadcast channel: emitting with no
//! subscribers is not an error, and a lagging subscriber only loses its own
//! backlog.

use crate::job::JobProgress;
use crate::provider::PhotoKind;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Emitted whenever a job's progress changes, including per-retry updates
/// during provider backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressEvent {
    pub job_id: String,
    pub progress: JobProgress,
    pub attempts_made: u32,
}

/// Emitted when a job completes successfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCompletedEvent {
    pub job_id: String,
    pub output_keys: Vec<String>,
}

/// Emitted when a job fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFailedEvent {
    pub job_id: String,
    pub error: String,
}

/// Emitted when a classification run finishes, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoClassifiedEvent {
    pub photo_id: String,
    pub kind: PhotoKind,
    pub confidence: f32,
    pub failed: bool,
}

/// Every event the pipeline can emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PipelineEvent {
    JobProgress(JobProgressEvent),
    JobCompleted(JobCompletedEvent),
    JobFailed(JobFailedEvent),
    PhotoClassified(PhotoClassifiedEvent),
}

/// Cloneable handle for emitting and subscribing to pipeline events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Best-effort emit; a missing audience is fine.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
