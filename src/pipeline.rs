//! The pipeline facade: generation jobs, photo classification, credits.
//!
//! One `Pipeline` owns its database, blob store handle, classification queue
//! and event bus; multiple generation jobs run through it independently and
//! share no mutable state beyond those collaborators.

use crate::classify::{CapturedKind, ClassificationQueue, ClassificationStatus, QueueSnapshot};
use crate::config::PipelineConfig;
use crate::credits;
use crate::db;
use crate::error::{PipelineError, Result};
use crate::events::{
    EventBus, JobCompletedEvent, JobFailedEvent, JobProgressEvent, PhotoClassifiedEvent,
    PipelineEvent,
};
use crate::job::{JobProgress, JobStatusView};
use crate::provider::{Classification, GenerationRequest, ImageProvider, PhotoKind};
use crate::retry::{with_retry, RetryAttempt, RetryPolicy};
use crate::storage::BlobStore;
use crate::style::{PreparedAsset, StyleConfiguration};
use crate::validator::required_asset_errors;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const PERCENT_VALIDATING: u8 = 10;
const PERCENT_GENERATING: u8 = 25;
const PERCENT_SAVING: u8 = 90;

/// Asynchronous portrait pipeline over a generative-model provider.
///
/// # Example
///
/// ```ignore
/// let pipeline = Pipeline::new(
///     PipelineConfig::default(),
///     my_provider,
///     Arc::new(MemoryBlobStore::new()),
/// )?;
///
/// pipeline.grant_credits("person-1", 5)?;
/// let photo_id = pipeline.add_reference_photo("person-1", photo_bytes)?;
/// pipeline.enqueue_classification(&photo_id)?;
///
/// let job_id = pipeline.create_job("person-1", &input_key, style)?;
/// pipeline.run_job(&job_id, &prepared_assets).await?;
/// ```
pub struct Pipeline<P> {
    config: PipelineConfig,
    db: Arc<Mutex<Connection>>,
    blobs: Arc<dyn BlobStore>,
    provider: Arc<P>,
    events: EventBus,
    queue: ClassificationQueue,
}

impl<P> Pipeline<P>
where
    P: ImageProvider + 'static,
{
    /// Create a pipeline, opening (or creating) the database and requeuing
    /// any jobs that were mid-processing when a previous process died.
    pub fn new(config: PipelineConfig, provider: P, blobs: Arc<dyn BlobStore>) -> Result<Self> {
        let conn = db::open_database(config.db_path.as_deref())?;

        let requeued = db::requeue_interrupted(&conn)?;
        if requeued > 0 {
            info!(requeued, "requeued jobs interrupted by a previous shutdown");
        }

        let queue = ClassificationQueue::new(config.max_concurrent);

        Ok(Self {
            config,
            db: Arc::new(Mutex::new(conn)),
            blobs,
            provider: Arc::new(provider),
            events: EventBus::default(),
            queue,
        })
    }

    /// Subscribe to pipeline events.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    // ── Generation jobs ─────────────────────────────────────────────

    /// Create a pending job, reserving its credit cost up front. Returns the
    /// job ID, or [`PipelineError::InsufficientCredits`] when the person's
    /// balance cannot cover it.
    pub fn create_job(
        &self,
        person_id: &str,
        input_key: &str,
        style: StyleConfiguration,
    ) -> Result<String> {
        let job_id = uuid::Uuid::new_v4().to_string();

        let mut conn = self
            .db
            .lock()
            .map_err(|e| PipelineError::Other(e.to_string()))?;
        let tx = conn.transaction().map_err(PipelineError::Database)?;

        if !credits::reserve(&tx, person_id, &job_id, self.config.credit_cost)? {
            return Err(PipelineError::InsufficientCredits(person_id.to_string()));
        }
        db::insert_job(
            &tx,
            &job_id,
            person_id,
            input_key,
            &style,
            self.config.credit_cost,
        )?;
        tx.commit().map_err(PipelineError::Database)?;

        Ok(job_id)
    }

    /// Run a pending job to a terminal state.
    ///
    /// Job-level failures (unready assets, provider errors after retries)
    /// land in the job's status rather than in the returned `Result`; `Err`
    /// is reserved for infrastructure problems like a broken database.
    pub async fn run_job(&self, job_id: &str, assets: &[PreparedAsset]) -> Result<JobStatusView> {
        let job = self
            .get_job(job_id)?
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;

        {
            let conn = self
                .db
                .lock()
                .map_err(|e| PipelineError::Other(e.to_string()))?;
            if !db::mark_processing(&conn, job_id)? {
                return Err(PipelineError::InvalidState(format!(
                    "job {} is {}, expected pending",
                    job_id,
                    job.status.as_str()
                )));
            }
        }
        self.update_progress(job_id, PERCENT_VALIDATING, "Validating prepared assets", 0)?;

        // Readiness gate: fail fast with zero provider calls and the credit
        // hold released.
        let violations = required_asset_errors(&job.style, assets);
        if !violations.is_empty() {
            self.fail_job(job_id, &violations.join("; "))?;
            return self.job_status(job_id);
        }

        let Some(photo) = self.blobs.get(&job.input_key)? else {
            self.fail_job(
                job_id,
                &format!("Reference photo missing from storage: {}", job.input_key),
            )?;
            return self.job_status(job_id);
        };

        self.update_progress(job_id, PERCENT_GENERATING, "Generating portraits", 1)?;

        let request = GenerationRequest {
            photo,
            style: job.style.clone(),
            assets: assets.to_vec(),
        };

        let retry_db = Arc::clone(&self.db);
        let retry_events = self.events.clone();
        let retry_job_id = job_id.to_string();
        let on_retry = move |attempt: RetryAttempt| {
            let db = Arc::clone(&retry_db);
            let events = retry_events.clone();
            let job_id = retry_job_id.clone();
            async move {
                // The next attempt number, so observers see movement during
                // the backoff wait.
                let attempts_made = attempt.attempt + 1;
                let message = format!(
                    "Provider rate limited, retrying (attempt {} of {})",
                    attempts_made,
                    attempt.max_retries + 1
                );
                let updated = match db.lock() {
                    Ok(conn) => db::update_progress(
                        &conn,
                        &job_id,
                        PERCENT_GENERATING,
                        &message,
                        attempts_made,
                    )
                    .unwrap_or(false),
                    Err(_) => false,
                };
                if updated {
                    events.emit(PipelineEvent::JobProgress(JobProgressEvent {
                        job_id,
                        progress: JobProgress {
                            percent: PERCENT_GENERATING,
                            message,
                        },
                        attempts_made,
                    }));
                }
            }
        };

        let outcome = with_retry(
            &self.config.retry,
            || self.provider.generate(&request),
            on_retry,
        )
        .await;

        match outcome {
            Ok(output) => {
                self.update_progress(job_id, PERCENT_SAVING, "Saving outputs", 0)?;

                let mut output_keys = Vec::with_capacity(output.images.len());
                for (index, image) in output.images.into_iter().enumerate() {
                    let key = format!("jobs/{}/output-{}.png", job_id, index);
                    self.blobs.put(&key, image)?;
                    output_keys.push(key);
                }

                self.complete_job(job_id, &output_keys)?;
            }
            Err(err) => {
                self.fail_job(job_id, &err.to_string())?;
            }
        }

        self.job_status(job_id)
    }

    /// What a polling observer sees for one job.
    pub fn job_status(&self, job_id: &str) -> Result<JobStatusView> {
        let job = self
            .get_job(job_id)?
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;
        Ok(JobStatusView::from(&job))
    }

    /// Record which generated output the person accepted. The key must be
    /// one of the job's outputs and the job must be completed.
    pub fn accept_output(&self, job_id: &str, output_key: &str) -> Result<()> {
        let job = self
            .get_job(job_id)?
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;
        if !job.output_keys.iter().any(|k| k == output_key) {
            return Err(PipelineError::InvalidState(format!(
                "{} is not an output of job {}",
                output_key, job_id
            )));
        }

        let conn = self
            .db
            .lock()
            .map_err(|e| PipelineError::Other(e.to_string()))?;
        if !db::set_accepted(&conn, job_id, output_key)? {
            return Err(PipelineError::InvalidState(format!(
                "job {} is not completed",
                job_id
            )));
        }
        Ok(())
    }

    /// Soft-delete a job from any state. Clears and drops its outputs and
    /// releases an un-consumed credit hold. Idempotent.
    pub fn delete_job(&self, job_id: &str) -> Result<()> {
        let cleared = {
            let mut conn = self
                .db
                .lock()
                .map_err(|e| PipelineError::Other(e.to_string()))?;
            let tx = conn.transaction().map_err(PipelineError::Database)?;
            let cleared = db::delete_job(&tx, job_id)?;
            credits::release(&tx, job_id)?;
            tx.commit().map_err(PipelineError::Database)?;
            cleared
        };

        for key in &cleared {
            self.blobs.delete(key)?;
        }
        Ok(())
    }

    fn get_job(&self, job_id: &str) -> Result<Option<crate::job::GenerationJob>> {
        let conn = self
            .db
            .lock()
            .map_err(|e| PipelineError::Other(e.to_string()))?;
        Ok(db::get_job(&conn, job_id)?)
    }

    /// Progress write guarded by the processing state; a terminal job
    /// silently swallows it. `attempts_made` of 0 leaves the counter alone.
    fn update_progress(
        &self,
        job_id: &str,
        percent: u8,
        message: &str,
        attempts_made: u32,
    ) -> Result<()> {
        let (updated, attempts) = {
            let conn = self
                .db
                .lock()
                .map_err(|e| PipelineError::Other(e.to_string()))?;
            let attempts = if attempts_made == 0 {
                db::get_job(&conn, job_id)?
                    .map(|j| j.attempts_made)
                    .unwrap_or(0)
            } else {
                attempts_made
            };
            (
                db::update_progress(&conn, job_id, percent, message, attempts)?,
                attempts,
            )
        };

        if updated {
            self.events.emit(PipelineEvent::JobProgress(JobProgressEvent {
                job_id: job_id.to_string(),
                progress: JobProgress {
                    percent,
                    message: message.to_string(),
                },
                attempts_made: attempts,
            }));
        }
        Ok(())
    }

    /// Completed status write and credit consumption in one transaction.
    fn complete_job(&self, job_id: &str, output_keys: &[String]) -> Result<()> {
        let completed = {
            let mut conn = self
                .db
                .lock()
                .map_err(|e| PipelineError::Other(e.to_string()))?;
            let tx = conn.transaction().map_err(PipelineError::Database)?;
            let completed = db::mark_completed(&tx, job_id, output_keys)?;
            if completed {
                credits::consume(&tx, job_id)?;
            }
            tx.commit().map_err(PipelineError::Database)?;
            completed
        };

        if completed {
            self.events
                .emit(PipelineEvent::JobCompleted(JobCompletedEvent {
                    job_id: job_id.to_string(),
                    output_keys: output_keys.to_vec(),
                }));
        } else {
            // The job left the processing state under us (deleted); drop the
            // blobs we just wrote and keep the credits untouched.
            warn!(job_id, "job left processing before completion; discarding outputs");
            for key in output_keys {
                self.blobs.delete(key)?;
            }
        }
        Ok(())
    }

    /// Failed status write and credit release in one transaction.
    fn fail_job(&self, job_id: &str, error: &str) -> Result<()> {
        let failed = {
            let mut conn = self
                .db
                .lock()
                .map_err(|e| PipelineError::Other(e.to_string()))?;
            let tx = conn.transaction().map_err(PipelineError::Database)?;
            let failed = db::mark_failed(&tx, job_id, error)?;
            if failed {
                credits::release(&tx, job_id)?;
            }
            tx.commit().map_err(PipelineError::Database)?;
            failed
        };

        if failed {
            self.events.emit(PipelineEvent::JobFailed(JobFailedEvent {
                job_id: job_id.to_string(),
                error: error.to_string(),
            }));
        }
        Ok(())
    }

    // ── Reference photos & classification ───────────────────────────

    /// Store a new reference photo and register it, unclassified. Returns
    /// the photo ID.
    pub fn add_reference_photo(&self, person_id: &str, bytes: Vec<u8>) -> Result<String> {
        let photo_id = uuid::Uuid::new_v4().to_string();
        let storage_key = format!("photos/{}.png", photo_id);
        self.blobs.put(&storage_key, bytes)?;

        let conn = self
            .db
            .lock()
            .map_err(|e| PipelineError::Other(e.to_string()))?;
        db::insert_photo(&conn, &photo_id, person_id, &storage_key)?;
        Ok(photo_id)
    }

    /// Mark a photo as selected (or not) for use as generation material.
    pub fn set_photo_selected(&self, photo_id: &str, selected: bool) -> Result<()> {
        let conn = self
            .db
            .lock()
            .map_err(|e| PipelineError::Other(e.to_string()))?;
        if !db::set_photo_selected(&conn, photo_id, selected)? {
            return Err(PipelineError::PhotoNotFound(photo_id.to_string()));
        }
        Ok(())
    }

    /// Queue one classification run for a photo. Returns false when the
    /// photo is already active or waiting in the queue.
    pub fn enqueue_classification(&self, photo_id: &str) -> Result<bool> {
        let photo = {
            let conn = self
                .db
                .lock()
                .map_err(|e| PipelineError::Other(e.to_string()))?;
            db::get_photo(&conn, photo_id)?
        }
        .ok_or_else(|| PipelineError::PhotoNotFound(photo_id.to_string()))?;

        let work = classify_photo(
            Arc::clone(&self.db),
            Arc::clone(&self.blobs),
            Arc::clone(&self.provider),
            self.config.retry.clone(),
            self.events.clone(),
            photo.id.clone(),
            photo.storage_key,
        );
        Ok(self.queue.enqueue(photo.id, work))
    }

    /// Re-queue photos whose last classification run failed, bounded by the
    /// configured attempt ceiling. Returns how many were queued.
    pub fn sweep_failed_classifications(&self) -> Result<u32> {
        let candidates = {
            let conn = self
                .db
                .lock()
                .map_err(|e| PipelineError::Other(e.to_string()))?;
            db::list_failed_classifications(&conn, self.config.max_classification_attempts)?
        };

        let mut swept = 0;
        for photo_id in candidates {
            if self.enqueue_classification(&photo_id)? {
                swept += 1;
            }
        }
        Ok(swept)
    }

    /// Per-kind coverage for a person's photos plus the live queue snapshot.
    pub fn classification_status(&self, person_id: &str) -> Result<ClassificationStatus> {
        let photos = {
            let conn = self
                .db
                .lock()
                .map_err(|e| PipelineError::Other(e.to_string()))?;
            db::list_photos_for_person(&conn, person_id)?
        };

        let mut best: [Option<f32>; 3] = [None, None, None];
        for photo in &photos {
            // Failure markers never count as coverage.
            if photo.classify_error.is_some() {
                continue;
            }
            let Some(classification) = &photo.classification else {
                continue;
            };
            let slot = match classification.kind {
                PhotoKind::FrontView => 0,
                PhotoKind::SideView => 1,
                PhotoKind::FullBody => 2,
                PhotoKind::Unknown => continue,
            };
            best[slot] = Some(match best[slot] {
                Some(existing) => existing.max(classification.confidence),
                None => classification.confidence,
            });
        }

        let captured = |confidence: Option<f32>| CapturedKind {
            captured: confidence.is_some(),
            confidence,
        };

        Ok(ClassificationStatus {
            front_view: captured(best[0]),
            side_view: captured(best[1]),
            full_body: captured(best[2]),
            queue: self.queue.status(),
        })
    }

    /// Live snapshot of the classification queue.
    pub fn queue_snapshot(&self) -> QueueSnapshot {
        self.queue.status()
    }

    // ── Credits ─────────────────────────────────────────────────────

    pub fn grant_credits(&self, owner_id: &str, amount: i64) -> Result<()> {
        let conn = self
            .db
            .lock()
            .map_err(|e| PipelineError::Other(e.to_string()))?;
        Ok(credits::grant(&conn, owner_id, amount)?)
    }

    pub fn credit_balance(&self, owner_id: &str) -> Result<i64> {
        let conn = self
            .db
            .lock()
            .map_err(|e| PipelineError::Other(e.to_string()))?;
        Ok(credits::balance(&conn, owner_id)?)
    }

    /// Move credits from a team pool to a person. Returns false when the
    /// source balance is insufficient.
    pub fn transfer_credits(&self, from_owner: &str, to_owner: &str, amount: i64) -> Result<bool> {
        let conn = self
            .db
            .lock()
            .map_err(|e| PipelineError::Other(e.to_string()))?;
        Ok(credits::transfer(&conn, from_owner, to_owner, amount)?)
    }
}

/// One classification run. Never lets an error escape: failures become a
/// normal, recognizable result so polling is never blocked and a later sweep
/// can re-target the photo.
async fn classify_photo<P: ImageProvider>(
    db: Arc<Mutex<Connection>>,
    blobs: Arc<dyn BlobStore>,
    provider: Arc<P>,
    policy: RetryPolicy,
    events: EventBus,
    photo_id: String,
    storage_key: String,
) {
    let outcome: Result<Classification> = async {
        let bytes = blobs
            .get(&storage_key)?
            .ok_or_else(|| PipelineError::BlobMissing(storage_key.clone()))?;
        let classification = with_retry(
            &policy,
            || provider.classify(&bytes),
            |attempt: RetryAttempt| async move {
                debug!(
                    attempt = attempt.attempt,
                    max_retries = attempt.max_retries,
                    "classification rate limited, backing off"
                );
            },
        )
        .await?;
        Ok(classification)
    }
    .await;

    match outcome {
        Ok(classification) => {
            let written = match db.lock() {
                Ok(conn) => db::set_classification(&conn, &photo_id, &classification).is_ok(),
                Err(_) => false,
            };
            if !written {
                warn!(photo_id, "failed to persist classification result");
            }
            events.emit(PipelineEvent::PhotoClassified(PhotoClassifiedEvent {
                photo_id,
                kind: classification.kind,
                confidence: classification.confidence,
                failed: false,
            }));
        }
        Err(err) => {
            warn!(photo_id, error = %err, "classification run failed");
            if let Ok(conn) = db.lock() {
                if let Err(db_err) =
                    db::mark_classification_failed(&conn, &photo_id, &err.to_string())
                {
                    warn!(photo_id, error = %db_err, "failed to record classification failure");
                }
            }
            events.emit(PipelineEvent::PhotoClassified(PhotoClassifiedEvent {
                photo_id,
                kind: PhotoKind::Unknown,
                confidence: 0.0,
                failed: true,
            }));
        }
    }
}
