//! Hosted embedding clients.
//!
//! Two wire formats are supported: OpenAI-compatible `/embeddings` and Qdrant Cloud
//! Inference. Clients make exactly one HTTP attempt per call; retries are the caller's
//! business ([`embed_with_retry`]).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("invalid embedding client configuration: {0}")]
    Config(String),

    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),

    #[error("embedding API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("embedding API returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },

    #[error("embedding response missing vectors")]
    MissingVectors,
}

impl EmbeddingError {
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbeddingError::Http(e) => e.is_connect() || e.is_request() || e.is_body(),
            EmbeddingError::Timeout(_) => true,
            EmbeddingError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds `inputs` in order. At most [`Embedder::batch_size`] inputs per call.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    fn batch_size(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Retry budget for [`embed_with_retry`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    /// Exponential: base, 2×base, 4×base … capped at 32×base.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let capped = attempt.saturating_sub(1).min(5);
        self.base_backoff * (1u32 << capped)
    }
}

/// Calls `embedder` until it succeeds, the error is not retryable, or the attempt budget is
/// spent.
pub async fn embed_with_retry(
    embedder: &dyn Embedder,
    inputs: &[String],
    policy: RetryPolicy,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut attempt = 1;
    loop {
        match embedder.embed(inputs).await {
            Ok(vectors) => return Ok(vectors),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    "Embedding attempt {attempt}/{} failed ({e}); retrying in {}ms",
                    policy.max_attempts,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn build_client(headers: HeaderMap, timeout: Duration) -> Result<Client, EmbeddingError> {
    Ok(Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()?)
}

async fn post_json<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
    client: &Client,
    endpoint: &str,
    body: &B,
    timeout: Duration,
) -> Result<R, EmbeddingError> {
    let map_err = |e: reqwest::Error| {
        if e.is_timeout() {
            EmbeddingError::Timeout(timeout)
        } else {
            EmbeddingError::Http(e)
        }
    };
    let response = client.post(endpoint).json(body).send().await.map_err(map_err)?;
    let status = response.status();
    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_string());
        return Err(api_error(status, message));
    }
    response.json::<R>().await.map_err(map_err)
}

fn api_error(status: StatusCode, message: String) -> EmbeddingError {
    EmbeddingError::Api {
        status: status.as_u16(),
        message,
    }
}

fn check_batch(inputs: &[String], batch_size: usize) -> Result<(), EmbeddingError> {
    if inputs.len() > batch_size {
        return Err(EmbeddingError::Config(format!(
            "batch of {} exceeds configured max {}",
            inputs.len(),
            batch_size
        )));
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible /embeddings
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    batch_size: usize,
    timeout: Duration,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: String,
        dimensions: Option<usize>,
        timeout: Duration,
        batch_size: usize,
    ) -> Result<Self, EmbeddingError> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::Config("missing embedding API key".to_string()));
        }
        if model.trim().is_empty() {
            return Err(EmbeddingError::Config("missing embedding model name".to_string()));
        }
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| EmbeddingError::Config("invalid embedding API key".to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            client: build_client(headers, timeout)?,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            dimensions,
            batch_size: batch_size.max(1),
            timeout,
        })
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    data: Vec<OpenAiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbedding {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiResponse {
    fn into_vectors(mut self, expected: usize) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if self.data.len() != expected {
            return Err(EmbeddingError::CountMismatch {
                expected,
                got: self.data.len(),
            });
        }
        self.data.sort_by_key(|entry| entry.index);
        Ok(self.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        check_batch(inputs, self.batch_size)?;
        let request = OpenAiRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };
        let response: OpenAiResponse =
            post_json(&self.client, &self.endpoint, &request, self.timeout).await?;
        response.into_vectors(inputs.len())
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Qdrant Cloud Inference
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct QdrantInferenceEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    batch_size: usize,
    timeout: Duration,
}

impl QdrantInferenceEmbedder {
    /// `endpoint` is the full inference URL, e.g.
    /// `https://<cluster>.cloud.qdrant.io/inference/text`.
    pub fn new(
        api_key: &str,
        endpoint: &str,
        model: String,
        timeout: Duration,
        batch_size: usize,
    ) -> Result<Self, EmbeddingError> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingError::Config("missing Qdrant API key".to_string()));
        }
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(EmbeddingError::Config(
                "Qdrant inference endpoint must be an http(s) URL".to_string(),
            ));
        }
        let mut headers = HeaderMap::new();
        headers.insert(
            "api-key",
            HeaderValue::from_str(api_key.trim())
                .map_err(|_| EmbeddingError::Config("invalid Qdrant API key".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            client: build_client(headers, timeout)?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
            batch_size: batch_size.max(1),
            timeout,
        })
    }
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    data: Vec<InferenceData>,
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct InferenceData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl InferenceResponse {
    fn into_vectors(self, expected: usize) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if !self.data.is_empty() {
            if self.data.len() != expected {
                return Err(EmbeddingError::CountMismatch {
                    expected,
                    got: self.data.len(),
                });
            }
            let mut data = self.data;
            data.sort_by_key(|d| d.index.unwrap_or(0));
            return Ok(data.into_iter().map(|d| d.embedding).collect());
        }
        if !self.embeddings.is_empty() {
            if self.embeddings.len() != expected {
                return Err(EmbeddingError::CountMismatch {
                    expected,
                    got: self.embeddings.len(),
                });
            }
            return Ok(self.embeddings);
        }
        Err(EmbeddingError::MissingVectors)
    }
}

#[async_trait]
impl Embedder for QdrantInferenceEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        check_batch(inputs, self.batch_size)?;
        let request = InferenceRequest {
            model: &self.model,
            input: inputs,
        };
        let response: InferenceResponse =
            post_json(&self.client, &self.endpoint, &request, self.timeout).await?;
        response.into_vectors(inputs.len())
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    /// Deterministic bag-of-words embedder: each vocabulary word is one dimension.
    /// Inputs containing a word from `poisoned` fail with a retryable error.
    pub struct KeywordEmbedder {
        pub vocabulary: Vec<&'static str>,
        pub poisoned: HashSet<&'static str>,
        pub batch_size: usize,
        pub calls: Mutex<usize>,
    }

    impl KeywordEmbedder {
        pub fn new(vocabulary: &[&'static str]) -> Self {
            Self {
                vocabulary: vocabulary.to_vec(),
                poisoned: HashSet::new(),
                batch_size: 4,
                calls: Mutex::new(0),
            }
        }

        pub fn vector(&self, text: &str) -> Vec<f32> {
            let lower = text.to_lowercase();
            let mut v: Vec<f32> = self
                .vocabulary
                .iter()
                .map(|w| lower.matches(w).count() as f32)
                .collect();
            // constant bias keeps every vector non-zero
            v.push(0.01);
            v
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            *self.calls.lock().unwrap() += 1;
            check_batch(inputs, self.batch_size)?;
            if inputs
                .iter()
                .any(|i| self.poisoned.iter().any(|p| i.contains(p)))
            {
                return Err(EmbeddingError::Api {
                    status: 503,
                    message: "overloaded".to_string(),
                });
            }
            Ok(inputs.iter().map(|i| self.vector(i)).collect())
        }

        fn batch_size(&self) -> usize {
            self.batch_size
        }

        fn model_name(&self) -> &str {
            "keyword"
        }
    }
}
