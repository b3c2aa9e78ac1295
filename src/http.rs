//! REST client for a hosted generative-model service.
//!
//! [`RestProvider`] is the production [`ImageProvider`]: images travel
//! base64-inlined in JSON bodies, and responses are mapped onto the closed
//! [`ProviderError`] union at this boundary. HTTP 429, or any error body the
//! structural classifier recognizes, becomes `RateLimited` so the retry
//! layer upstream can spend budget on it.

use crate::error::ProviderError;
use crate::provider::{Classification, GenerationRequest, GenerationOutput, ImageProvider};
use crate::rate_limit::payload_is_rate_limited;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, Response};
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_GENERATE_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(60);

fn normalize(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// Async client for the portrait-generation service.
///
/// # Example
/// ```no_run
/// use portrait_pipeline::RestProvider;
///
/// let provider = RestProvider::new("https://api.example.com")
///     .with_api_key("sk-...");
/// ```
#[derive(Debug, Clone)]
pub struct RestProvider {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    generate_timeout: Duration,
    classify_timeout: Duration,
}

impl RestProvider {
    /// Create a new provider pointing at the given service endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            endpoint: normalize(endpoint.into()),
            api_key: None,
            generate_timeout: DEFAULT_GENERATE_TIMEOUT,
            classify_timeout: DEFAULT_CLASSIFY_TIMEOUT,
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Set the bearer token sent with every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Override the per-request timeout for generation calls.
    pub fn with_generate_timeout(mut self, timeout: Duration) -> Self {
        self.generate_timeout = timeout;
        self
    }

    /// Override the per-request timeout for classification calls.
    pub fn with_classify_timeout(mut self, timeout: Duration) -> Self {
        self.classify_timeout = timeout;
        self
    }

    /// Returns the configured endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(
        &self,
        path: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<Response, ProviderError> {
        let url = format!("{}{}", self.endpoint, path);
        let mut request = self.http.post(&url).timeout(timeout).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        request.send().await.map_err(|e| {
            ProviderError::Network(format!("Cannot reach {}: {}", self.endpoint, e))
        })
    }
}

impl ImageProvider for RestProvider {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, ProviderError> {
        let assets: Vec<Value> = request
            .assets
            .iter()
            .map(|asset| {
                json!({
                    "elementId": asset.element_id,
                    "kind": asset.kind,
                    "payload": BASE64.encode(&asset.payload),
                    "metadata": asset.metadata,
                })
            })
            .collect();
        let body = json!({
            "photo": BASE64.encode(&request.photo),
            "style": request.style,
            "assets": assets,
        });

        let resp = self.post("/v1/generate", &body, self.generate_timeout).await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        let payload: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Provider(format!("Invalid generate response: {}", e)))?;

        let images = payload
            .get("images")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ProviderError::Provider("Generate response missing 'images' array".to_string())
            })?
            .iter()
            .map(|entry| {
                entry
                    .as_str()
                    .ok_or_else(|| {
                        ProviderError::Provider("Image entry is not a string".to_string())
                    })
                    .and_then(|b64| {
                        BASE64.decode(b64).map_err(|e| {
                            ProviderError::Provider(format!("Image entry is not base64: {}", e))
                        })
                    })
            })
            .collect::<Result<Vec<Vec<u8>>, ProviderError>>()?;

        if images.is_empty() {
            return Err(ProviderError::Provider(
                "Generate response contained no images".to_string(),
            ));
        }
        Ok(GenerationOutput { images })
    }

    async fn classify(&self, image: &[u8]) -> Result<Classification, ProviderError> {
        let body = json!({ "image": BASE64.encode(image) });

        let resp = self.post("/v1/classify", &body, self.classify_timeout).await?;
        if !resp.status().is_success() {
            return Err(error_from_response(resp).await);
        }

        resp.json::<Classification>()
            .await
            .map_err(|e| ProviderError::Provider(format!("Invalid classify response: {}", e)))
    }
}

/// Map a non-success response onto the error union. A 429 status, or an
/// error body the structural classifier recognizes, is a rate limit; the
/// `Retry-After` header is honored in whole seconds when present.
async fn error_from_response(resp: Response) -> ProviderError {
    let status = resp.status().as_u16();
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = resp.text().await.unwrap_or_default();

    if status == 429 {
        return ProviderError::RateLimited { retry_after };
    }
    if let Ok(value) = serde_json::from_str::<Value>(&body) {
        if payload_is_rate_limited(&value) {
            return ProviderError::RateLimited { retry_after };
        }
    }
    ProviderError::Provider(format!("HTTP {}: {}", status, body))
}
