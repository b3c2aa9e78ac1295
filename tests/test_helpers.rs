use portrait_pipeline::*;
// The crate's glob brings in its one-parameter `Result` alias; the provider
// trait methods need the two-parameter prelude form.
use std::result::Result;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Scriptable provider for integration tests. Counters are shared so tests
/// can keep a clone and assert call counts after the pipeline takes
/// ownership.
#[derive(Clone)]
pub struct MockProvider {
    pub generate_calls: Arc<AtomicU32>,
    pub classify_calls: Arc<AtomicU32>,
    rate_limited_generates: u32,
    rate_limited_classifies: u32,
    generate_error: Option<String>,
    classify_error: Option<String>,
    retry_after: Option<Duration>,
    classification: Classification,
    gate: Option<watch::Receiver<bool>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            generate_calls: Arc::new(AtomicU32::new(0)),
            classify_calls: Arc::new(AtomicU32::new(0)),
            rate_limited_generates: 0,
            rate_limited_classifies: 0,
            generate_error: None,
            classify_error: None,
            retry_after: None,
            classification: front_view_classification(),
            gate: None,
        }
    }

    /// The first `n` generate calls answer with a rate limit.
    pub fn rate_limited_generates(mut self, n: u32) -> Self {
        self.rate_limited_generates = n;
        self
    }

    /// The first `n` classify calls answer with a rate limit.
    pub fn rate_limited_classifies(mut self, n: u32) -> Self {
        self.rate_limited_classifies = n;
        self
    }

    /// Every generate call fails permanently with this message.
    pub fn generate_failure(mut self, message: &str) -> Self {
        self.generate_error = Some(message.to_string());
        self
    }

    /// Every classify call fails permanently with this message.
    pub fn classify_failure(mut self, message: &str) -> Self {
        self.classify_error = Some(message.to_string());
        self
    }

    /// Attach a server-suggested wait to rate-limit answers.
    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        self.retry_after = Some(wait);
        self
    }

    /// Override the classification returned on success.
    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = classification;
        self
    }

    /// Block every classify call until the sender flips to `true`. Lets a
    /// test hold the queue full while it inspects the snapshot.
    pub fn gated(mut self, release: &watch::Sender<bool>) -> Self {
        self.gate = Some(release.subscribe());
        self
    }
}

impl ImageProvider for MockProvider {
    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<GenerationOutput, ProviderError> {
        let call = self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.rate_limited_generates {
            return Err(ProviderError::RateLimited {
                retry_after: self.retry_after,
            });
        }
        if let Some(message) = &self.generate_error {
            return Err(ProviderError::Provider(message.clone()));
        }
        Ok(GenerationOutput {
            images: vec![vec![0xAA, 0xBB], vec![0xCC, 0xDD]],
        })
    }

    async fn classify(&self, _image: &[u8]) -> Result<Classification, ProviderError> {
        if let Some(gate) = &self.gate {
            let mut gate = gate.clone();
            while !*gate.borrow() {
                gate.changed().await.expect("gate sender dropped");
            }
        }
        let call = self.classify_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.rate_limited_classifies {
            return Err(ProviderError::RateLimited {
                retry_after: self.retry_after,
            });
        }
        if let Some(message) = &self.classify_error {
            return Err(ProviderError::Provider(message.clone()));
        }
        Ok(self.classification.clone())
    }
}

pub fn front_view_classification() -> Classification {
    Classification {
        kind: PhotoKind::FrontView,
        confidence: 0.93,
        person_count: 1,
        appropriate: true,
        well_lit: true,
        plain_background: true,
    }
}

/// In-memory pipeline with a millisecond-scale retry delay.
pub fn test_pipeline(provider: MockProvider) -> Pipeline<MockProvider> {
    let config = PipelineConfig::builder()
        .with_retry_policy(RetryPolicy::new(3, Duration::from_millis(1)))
        .build();
    Pipeline::new(config, provider, Arc::new(MemoryBlobStore::new())).expect("pipeline opens")
}

/// Poll until the classification queue drains.
pub async fn wait_idle(pipeline: &Pipeline<MockProvider>) {
    for _ in 0..500 {
        let snapshot = pipeline.queue_snapshot();
        if snapshot.running == 0 && snapshot.queued == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("classification queue did not drain");
}
