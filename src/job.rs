//! Generation job model.
//!
//! Lifecycle: Pending -> Processing -> Completed/Failed, with Deleted
//! reachable from any state. Deleted and the other two terminal states are
//! never left again; the guarded updates in [`crate::db`] enforce this at the
//! persistence layer.

use crate::style::StyleConfiguration;
use serde::{Deserialize, Serialize};

/// Job status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Deleted,
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "deleted" => Some(JobStatus::Deleted),
            _ => None,
        }
    }

    /// Completed, Failed and Deleted are terminal; nothing leaves them
    /// except the soft-delete, which is itself terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Deleted
        )
    }
}

/// Caller-visible progress for a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    /// 0..=100, monotonically non-decreasing per job.
    pub percent: u8,
    pub message: String,
}

/// One request to transform a reference photo into styled output image(s).
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub id: String,
    pub person_id: String,
    /// Blob-store key of the reference photo.
    pub input_key: String,
    pub style: StyleConfiguration,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub attempts_made: u32,
    /// Blob-store keys of the generated images (empty until completed).
    pub output_keys: Vec<String>,
    /// The output the person accepted, if any.
    pub accepted_key: Option<String>,
    pub error_message: Option<String>,
    pub credit_cost: i64,
    pub created_at: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// What a polling observer sees for one job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub attempts_made: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_key: Option<String>,
}

impl From<&GenerationJob> for JobStatusView {
    fn from(job: &GenerationJob) -> Self {
        Self {
            job_id: job.id.clone(),
            status: job.status,
            progress: job.progress.clone(),
            attempts_made: job.attempts_made,
            error: match job.status {
                JobStatus::Failed => job.error_message.clone(),
                _ => None,
            },
            output_keys: match job.status {
                JobStatus::Completed => job.output_keys.clone(),
                _ => Vec::new(),
            },
            accepted_key: match job.status {
                JobStatus::Completed => job.accepted_key.clone(),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Deleted,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Deleted.is_terminal());
    }

    #[test]
    fn test_status_view_hides_outputs_unless_completed() {
        let mut job = GenerationJob {
            id: "job-1".into(),
            person_id: "person-1".into(),
            input_key: "photos/ref.png".into(),
            style: StyleConfiguration::default(),
            status: JobStatus::Failed,
            progress: JobProgress {
                percent: 25,
                message: "Generating portraits".into(),
            },
            attempts_made: 4,
            output_keys: vec!["jobs/job-1/output-0.png".into()],
            accepted_key: None,
            error_message: Some("Provider rate limited the request".into()),
            credit_cost: 1,
            created_at: None,
            started_at: None,
            completed_at: None,
        };

        let failed = JobStatusView::from(&job);
        assert!(failed.output_keys.is_empty());
        assert!(failed.error.is_some());

        job.status = JobStatus::Completed;
        let completed = JobStatusView::from(&job);
        assert_eq!(completed.output_keys.len(), 1);
        assert!(completed.error.is_none());
    }
}
