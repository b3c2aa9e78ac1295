//! SQLite persistence for jobs and reference photos.
//!
//! Free functions over a shared `&Connection`, so callers can compose them
//! inside a single transaction (credit settlement must be atomic with the
//! terminal status write). Status transitions are guarded in SQL: terminal
//! states are never left, and progress never moves backwards or after a
//! terminal write.

use crate::job::{GenerationJob, JobProgress, JobStatus};
use crate::provider::Classification;
use crate::style::StyleConfiguration;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS generation_jobs (
    id               TEXT PRIMARY KEY,
    person_id        TEXT NOT NULL,
    input_key        TEXT NOT NULL,
    style_json       TEXT NOT NULL,
    status           TEXT NOT NULL
                     CHECK(status IN ('pending', 'processing', 'completed', 'failed', 'deleted')),
    progress_percent INTEGER NOT NULL DEFAULT 0,
    progress_message TEXT NOT NULL DEFAULT '',
    attempts_made    INTEGER NOT NULL DEFAULT 0,
    output_keys_json TEXT,
    accepted_key     TEXT,
    error_message    TEXT,
    credit_cost      INTEGER NOT NULL DEFAULT 1,
    created_at       DATETIME DEFAULT CURRENT_TIMESTAMP,
    started_at       DATETIME,
    completed_at     DATETIME
);

CREATE INDEX IF NOT EXISTS idx_jobs_person_status ON generation_jobs(person_id, status);

CREATE TABLE IF NOT EXISTS reference_photos (
    id                  TEXT PRIMARY KEY,
    person_id           TEXT NOT NULL,
    storage_key         TEXT NOT NULL,
    selected            INTEGER NOT NULL DEFAULT 0,
    classification_json TEXT,
    classify_attempts   INTEGER NOT NULL DEFAULT 0,
    classify_error      TEXT,
    created_at          DATETIME DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_photos_person ON reference_photos(person_id);

CREATE TABLE IF NOT EXISTS credit_balances (
    owner_id TEXT PRIMARY KEY,
    credits  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS credit_entries (
    job_id     TEXT NOT NULL,
    person_id  TEXT NOT NULL,
    kind       TEXT NOT NULL CHECK(kind IN ('reserve', 'consume', 'release')),
    amount     INTEGER NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(job_id, kind)
);
"#;

/// Open (or create) the pipeline database. Pass `None` for in-memory.
pub fn open_database(path: Option<&std::path::Path>) -> Result<Connection> {
    let conn = match path {
        Some(p) => Connection::open(p).context("Failed to open pipeline database")?,
        None => Connection::open_in_memory().context("Failed to open in-memory database")?,
    };

    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
    .context("Failed to set PRAGMA options")?;

    conn.execute_batch(SCHEMA)
        .context("Failed to create pipeline schema")?;

    Ok(conn)
}

// ── Generation jobs ─────────────────────────────────────────────────

/// Insert a new pending job.
pub fn insert_job(
    conn: &Connection,
    job_id: &str,
    person_id: &str,
    input_key: &str,
    style: &StyleConfiguration,
    credit_cost: i64,
) -> Result<()> {
    let style_json = serde_json::to_string(style)?;
    conn.execute(
        "INSERT INTO generation_jobs (id, person_id, input_key, style_json, status, credit_cost)
         VALUES (?1, ?2, ?3, ?4, 'pending', ?5)",
        params![job_id, person_id, input_key, style_json, credit_cost],
    )
    .context("Failed to insert generation job")?;
    Ok(())
}

fn job_from_row(row: &Row) -> rusqlite::Result<GenerationJob> {
    let style_json: String = row.get("style_json")?;
    let status_str: String = row.get("status")?;
    let output_keys_json: Option<String> = row.get("output_keys_json")?;
    let percent: i64 = row.get("progress_percent")?;
    let attempts: i64 = row.get("attempts_made")?;

    Ok(GenerationJob {
        id: row.get("id")?,
        person_id: row.get("person_id")?,
        input_key: row.get("input_key")?,
        style: serde_json::from_str(&style_json).unwrap_or_default(),
        status: JobStatus::parse(&status_str).unwrap_or(JobStatus::Failed),
        progress: JobProgress {
            percent: percent.clamp(0, 100) as u8,
            message: row.get("progress_message")?,
        },
        attempts_made: attempts.max(0) as u32,
        output_keys: output_keys_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default(),
        accepted_key: row.get("accepted_key")?,
        error_message: row.get("error_message")?,
        credit_cost: row.get("credit_cost")?,
        created_at: row.get("created_at")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
    })
}

/// Load a single job by ID.
pub fn get_job(conn: &Connection, job_id: &str) -> Result<Option<GenerationJob>> {
    conn.query_row(
        "SELECT * FROM generation_jobs WHERE id = ?1",
        params![job_id],
        job_from_row,
    )
    .optional()
    .context("Failed to load generation job")
}

/// Move a pending job into processing. Returns false if the job was not
/// pending (terminal states are never left).
pub fn mark_processing(conn: &Connection, job_id: &str) -> Result<bool> {
    let now = chrono::Utc::now().to_rfc3339();
    let rows = conn
        .execute(
            "UPDATE generation_jobs SET status = 'processing', started_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![now, job_id],
        )
        .context("Failed to mark job as processing")?;
    Ok(rows == 1)
}

/// Update progress and the attempt counter for a processing job.
///
/// Guarded so progress only moves while the job is processing and the
/// percentage never decreases. Returns false if the job was already terminal.
pub fn update_progress(
    conn: &Connection,
    job_id: &str,
    percent: u8,
    message: &str,
    attempts_made: u32,
) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE generation_jobs
             SET progress_percent = MAX(progress_percent, ?1),
                 progress_message = ?2,
                 attempts_made = ?3
             WHERE id = ?4 AND status = 'processing'",
            params![percent as i64, message, attempts_made as i64, job_id],
        )
        .context("Failed to update job progress")?;
    Ok(rows == 1)
}

/// Complete a processing job with its output keys. Returns false if the job
/// left the processing state in the meantime (the caller must then skip
/// credit consumption).
pub fn mark_completed(conn: &Connection, job_id: &str, output_keys: &[String]) -> Result<bool> {
    let now = chrono::Utc::now().to_rfc3339();
    let keys_json = serde_json::to_string(output_keys)?;
    let rows = conn
        .execute(
            "UPDATE generation_jobs
             SET status = 'completed', output_keys_json = ?1,
                 progress_percent = 100, progress_message = 'Completed',
                 completed_at = ?2
             WHERE id = ?3 AND status = 'processing'",
            params![keys_json, now, job_id],
        )
        .context("Failed to mark job as completed")?;
    Ok(rows == 1)
}

/// Fail a pending or processing job with an error message.
pub fn mark_failed(conn: &Connection, job_id: &str, error: &str) -> Result<bool> {
    let now = chrono::Utc::now().to_rfc3339();
    let rows = conn
        .execute(
            "UPDATE generation_jobs
             SET status = 'failed', error_message = ?1, completed_at = ?2
             WHERE id = ?3 AND status IN ('pending', 'processing')",
            params![error, now, job_id],
        )
        .context("Failed to mark job as failed")?;
    Ok(rows == 1)
}

/// Soft-delete a job from any state. Clears output keys and returns the keys
/// that were cleared so the caller can drop the blobs. Idempotent: deleting
/// an already-deleted job returns an empty list.
pub fn delete_job(conn: &Connection, job_id: &str) -> Result<Vec<String>> {
    let keys: Option<Option<String>> = conn
        .query_row(
            "SELECT output_keys_json FROM generation_jobs
             WHERE id = ?1 AND status != 'deleted'",
            params![job_id],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to read job outputs before delete")?;

    let Some(keys_json) = keys else {
        return Ok(Vec::new());
    };

    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE generation_jobs
         SET status = 'deleted', output_keys_json = NULL, accepted_key = NULL,
             completed_at = COALESCE(completed_at, ?1)
         WHERE id = ?2 AND status != 'deleted'",
        params![now, job_id],
    )
    .context("Failed to soft-delete job")?;

    Ok(keys_json
        .as_deref()
        .and_then(|json| serde_json::from_str(json).ok())
        .unwrap_or_default())
}

/// Record which output the person accepted. Only completed jobs can accept.
pub fn set_accepted(conn: &Connection, job_id: &str, output_key: &str) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE generation_jobs SET accepted_key = ?1
             WHERE id = ?2 AND status = 'completed'",
            params![output_key, job_id],
        )
        .context("Failed to record accepted output")?;
    Ok(rows == 1)
}

/// Re-queue jobs that were mid-processing when the process died.
/// Returns the number of jobs requeued.
pub fn requeue_interrupted(conn: &Connection) -> Result<u32> {
    let count = conn
        .execute(
            "UPDATE generation_jobs SET status = 'pending', started_at = NULL
             WHERE status = 'processing'",
            [],
        )
        .context("Failed to requeue interrupted jobs")?;
    Ok(count as u32)
}

// ── Reference photos ────────────────────────────────────────────────

/// Row data for one reference photo.
#[derive(Debug, Clone)]
pub struct PhotoRow {
    pub id: String,
    pub person_id: String,
    pub storage_key: String,
    pub selected: bool,
    pub classification: Option<Classification>,
    pub classify_attempts: u32,
    pub classify_error: Option<String>,
}

fn photo_from_row(row: &Row) -> rusqlite::Result<PhotoRow> {
    let classification_json: Option<String> = row.get("classification_json")?;
    let attempts: i64 = row.get("classify_attempts")?;
    Ok(PhotoRow {
        id: row.get("id")?,
        person_id: row.get("person_id")?,
        storage_key: row.get("storage_key")?,
        selected: row.get::<_, i64>("selected")? != 0,
        classification: classification_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok()),
        classify_attempts: attempts.max(0) as u32,
        classify_error: row.get("classify_error")?,
    })
}

/// Insert a new reference photo with no classification yet.
pub fn insert_photo(
    conn: &Connection,
    photo_id: &str,
    person_id: &str,
    storage_key: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO reference_photos (id, person_id, storage_key) VALUES (?1, ?2, ?3)",
        params![photo_id, person_id, storage_key],
    )
    .context("Failed to insert reference photo")?;
    Ok(())
}

/// Load a single photo by ID.
pub fn get_photo(conn: &Connection, photo_id: &str) -> Result<Option<PhotoRow>> {
    conn.query_row(
        "SELECT * FROM reference_photos WHERE id = ?1",
        params![photo_id],
        photo_from_row,
    )
    .optional()
    .context("Failed to load reference photo")
}

/// List all photos owned by a person.
pub fn list_photos_for_person(conn: &Connection, person_id: &str) -> Result<Vec<PhotoRow>> {
    let mut stmt = conn
        .prepare(
            "SELECT * FROM reference_photos WHERE person_id = ?1 ORDER BY created_at ASC",
        )
        .context("Failed to prepare photo listing")?;
    let rows = stmt
        .query_map(params![person_id], photo_from_row)
        .context("Failed to list reference photos")?;

    let mut photos = Vec::new();
    for row in rows {
        photos.push(row.context("Failed to read photo row")?);
    }
    Ok(photos)
}

/// Toggle whether a photo is selected as generation material.
pub fn set_photo_selected(conn: &Connection, photo_id: &str, selected: bool) -> Result<bool> {
    let rows = conn
        .execute(
            "UPDATE reference_photos SET selected = ?1 WHERE id = ?2",
            params![selected as i64, photo_id],
        )
        .context("Failed to update photo selection")?;
    Ok(rows == 1)
}

/// Record a successful classification, clearing any failure marker. Bumps the
/// attempt counter by one for the run that produced it.
pub fn set_classification(
    conn: &Connection,
    photo_id: &str,
    classification: &Classification,
) -> Result<()> {
    let json = serde_json::to_string(classification)?;
    conn.execute(
        "UPDATE reference_photos
         SET classification_json = ?1, classify_error = NULL,
             classify_attempts = classify_attempts + 1
         WHERE id = ?2",
        params![json, photo_id],
    )
    .context("Failed to store classification")?;
    Ok(())
}

/// Record a failed classification run: failure-marker classification plus the
/// error message, bumping the attempt counter.
pub fn mark_classification_failed(conn: &Connection, photo_id: &str, error: &str) -> Result<()> {
    let marker = serde_json::to_string(&Classification::failure_marker())?;
    conn.execute(
        "UPDATE reference_photos
         SET classification_json = ?1, classify_error = ?2,
             classify_attempts = classify_attempts + 1
         WHERE id = ?3",
        params![marker, error, photo_id],
    )
    .context("Failed to record classification failure")?;
    Ok(())
}

/// Photos whose last classification run failed and which still have attempt
/// budget left. Candidates for the re-classification sweep.
pub fn list_failed_classifications(conn: &Connection, max_attempts: u32) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT id FROM reference_photos
             WHERE classify_error IS NOT NULL AND classify_attempts < ?1
             ORDER BY created_at ASC",
        )
        .context("Failed to prepare failed-classification query")?;
    let rows = stmt
        .query_map(params![max_attempts as i64], |row| row.get(0))
        .context("Failed to query failed classifications")?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(row.context("Failed to read photo id")?);
    }
    Ok(ids)
}
