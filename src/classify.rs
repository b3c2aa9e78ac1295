//! Bounded concurrency queue for photo classification.
//!
//! Classification traffic shares one provider rate limit, so at most
//! `max_concurrent` classifications run at once; further photos wait in FIFO
//! order. The state is one owned, mutex-guarded structure, so separate
//! pipelines (and tests) get fully isolated queues.

use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tracing::{error, warn};

type Work = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Live snapshot of the queue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub active_ids: Vec<String>,
    pub queued_ids: Vec<String>,
    pub running: usize,
    pub queued: usize,
    pub max_concurrent: usize,
}

/// Whether a photo of one semantic kind has been captured, and how sure the
/// provider was.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedKind {
    pub captured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Per-person classification coverage plus the live queue snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationStatus {
    pub front_view: CapturedKind,
    pub side_view: CapturedKind,
    pub full_body: CapturedKind,
    pub queue: QueueSnapshot,
}

struct QueueState {
    active: HashSet<String>,
    waiting: VecDeque<(String, Work)>,
}

struct Inner {
    max_concurrent: usize,
    state: Mutex<QueueState>,
}

/// Bounded worker pool for classification jobs.
///
/// Invariants, held by construction behind one lock: a photo ID is in at most
/// one of the active/waiting sets, the active set never exceeds
/// `max_concurrent`, and waiting photos start in enqueue order.
#[derive(Clone)]
pub struct ClassificationQueue {
    inner: Arc<Inner>,
}

impl ClassificationQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                max_concurrent: max_concurrent.max(1),
                state: Mutex::new(QueueState {
                    active: HashSet::new(),
                    waiting: VecDeque::new(),
                }),
            }),
        }
    }

    /// Add one classification unit of work for a photo.
    ///
    /// Starts immediately when a slot is free, otherwise waits FIFO. Returns
    /// false (a no-op) when the photo is already active or waiting; starting
    /// the same photo twice concurrently would be a programmer error, so the
    /// duplicate is dropped loudly rather than corrupting the sets.
    pub fn enqueue<F>(&self, photo_id: impl Into<String>, work: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let photo_id = photo_id.into();
        {
            let mut state = match self.inner.state.lock() {
                Ok(state) => state,
                Err(e) => {
                    error!(error = %e, "classification queue lock poisoned");
                    return false;
                }
            };

            if state.active.contains(&photo_id)
                || state.waiting.iter().any(|(id, _)| id == &photo_id)
            {
                warn!(photo_id, "photo already queued for classification, ignoring");
                return false;
            }

            if state.active.len() >= self.inner.max_concurrent {
                state.waiting.push_back((photo_id, Box::pin(work)));
                return true;
            }
            state.active.insert(photo_id.clone());
        }

        spawn_slot(Arc::clone(&self.inner), photo_id, Box::pin(work));
        true
    }

    /// Live snapshot of active and waiting photo IDs.
    pub fn status(&self) -> QueueSnapshot {
        let (mut active_ids, queued_ids) = match self.inner.state.lock() {
            Ok(state) => (
                state.active.iter().cloned().collect::<Vec<_>>(),
                state
                    .waiting
                    .iter()
                    .map(|(id, _)| id.clone())
                    .collect::<Vec<_>>(),
            ),
            Err(_) => (Vec::new(), Vec::new()),
        };
        active_ids.sort();

        QueueSnapshot {
            running: active_ids.len(),
            queued: queued_ids.len(),
            max_concurrent: self.inner.max_concurrent,
            active_ids,
            queued_ids,
        }
    }

    /// True if the photo is currently active or waiting.
    pub fn contains(&self, photo_id: &str) -> bool {
        self.inner
            .state
            .lock()
            .map(|state| {
                state.active.contains(photo_id)
                    || state.waiting.iter().any(|(id, _)| id == photo_id)
            })
            .unwrap_or(false)
    }

    /// True when nothing is active or waiting.
    pub fn is_idle(&self) -> bool {
        self.inner
            .state
            .lock()
            .map(|state| state.active.is_empty() && state.waiting.is_empty())
            .unwrap_or(false)
    }
}

/// Run one unit of work in its slot, then release the slot and promote the
/// queue head, if any. The work future must not panic the invariants: it is
/// the caller's job (see `Pipeline::enqueue_classification`) to make it
/// non-throwing.
fn spawn_slot(inner: Arc<Inner>, photo_id: String, work: Work) {
    tokio::spawn(async move {
        work.await;

        let promoted = {
            let mut state = match inner.state.lock() {
                Ok(state) => state,
                Err(e) => {
                    error!(error = %e, "classification queue lock poisoned on completion");
                    return;
                }
            };
            state.active.remove(&photo_id);

            if let Some((next_id, next_work)) = state.waiting.pop_front() {
                state.active.insert(next_id.clone());
                Some((next_id, next_work))
            } else {
                None
            }
        };

        if let Some((next_id, next_work)) = promoted {
            spawn_slot(inner, next_id, next_work);
        }
    });
}
