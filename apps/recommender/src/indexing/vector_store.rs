//! Vector index backends.
//!
//! The index stores (point id, vector, payload) triples where the payload is the full
//! [`AssessmentRecord`], so search results need no second lookup against the catalog.
//! Point ids are UUIDv5 of the record id, which keeps re-indexing idempotent.

use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::store::{read_json, write_json_atomic};
use crate::models::assessment::AssessmentRecord;
use crate::models::query::QueryFilter;
use crate::models::test_type::TestType;

#[derive(Debug, Error)]
pub enum VectorStoreError {
    #[error("vector store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vector store request timed out after {0:?}")]
    Timeout(Duration),

    #[error("vector store error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("vector has {got} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("index has not been built; run the `index` command first")]
    NotBuilt,

    #[error("malformed point payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("local index storage failed: {0}")]
    Storage(String),
}

/// One record's vector. Exactly one per catalog record after a successful index run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingEntry {
    pub assessment_id: String,
    pub vector: Vec<f32>,
}

impl EmbeddingEntry {
    pub fn point_id(&self) -> Uuid {
        point_id(&self.assessment_id)
    }
}

pub fn point_id(assessment_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, assessment_id.as_bytes())
}

/// A search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub record: AssessmentRecord,
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Drops any existing points and prepares an empty index for `dimension`-long vectors.
    async fn recreate(&self, dimension: usize) -> Result<(), VectorStoreError>;

    async fn upsert(
        &self,
        points: &[(EmbeddingEntry, AssessmentRecord)],
    ) -> Result<(), VectorStoreError>;

    /// Nearest neighbours of `vector` among points whose payload satisfies `filter`.
    async fn search(
        &self,
        vector: &[f32],
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError>;

    /// Number of stored points.
    async fn count(&self) -> Result<usize, VectorStoreError>;
}

/// Builds the Qdrant payload filter for `filter`, or `None` when it has no conditions.
pub fn qdrant_filter(filter: &QueryFilter) -> Option<Value> {
    let mut must = Vec::new();
    if let Some(max) = filter.max_duration {
        must.push(json!({"key": "duration", "range": {"lte": max}}));
    }
    if let Some(remote) = filter.remote_testing {
        must.push(json!({"key": "remote_testing", "match": {"value": remote}}));
    }
    if let Some(adaptive) = filter.adaptive_support {
        must.push(json!({"key": "adaptive_support", "match": {"value": adaptive}}));
    }
    if !filter.test_types.is_empty() {
        let labels: Vec<&str> = filter.test_types.iter().map(|t| TestType::label(*t)).collect();
        must.push(json!({"key": "test_types", "match": {"any": labels}}));
    }
    if let Some(solution) = filter.solution_type {
        must.push(json!({"key": "solution_type", "match": {"value": solution}}));
    }
    (!must.is_empty()).then(|| json!({ "must": must }))
}

// ────────────────────────────────────────────────────────────────────────────
// Qdrant (REST)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct QdrantIndex {
    client: Client,
    base_url: String,
    collection: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct QdrantEnvelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct QdrantHit {
    score: f32,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct QdrantCount {
    count: usize,
}

impl QdrantIndex {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        collection: String,
        timeout: Duration,
    ) -> Result<Self, VectorStoreError> {
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            let value = HeaderValue::from_str(key.trim())
                .map_err(|_| VectorStoreError::Storage("invalid Qdrant API key".to_string()))?;
            headers.insert("api-key", value);
        }
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection,
            timeout,
        })
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{}", self.base_url, self.collection, suffix)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, VectorStoreError> {
        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        if status.as_u16() == 404 {
            debug!("Qdrant 404: {message}");
            return Err(VectorStoreError::NotBuilt);
        }
        Err(VectorStoreError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn map_transport(&self, e: reqwest::Error) -> VectorStoreError {
        if e.is_timeout() {
            VectorStoreError::Timeout(self.timeout)
        } else {
            VectorStoreError::Http(e)
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn recreate(&self, dimension: usize) -> Result<(), VectorStoreError> {
        match self.send(self.client.delete(self.collection_url(""))).await {
            Ok(_) | Err(VectorStoreError::NotBuilt) => {}
            Err(e) => return Err(e),
        }
        let body = json!({"vectors": {"size": dimension, "distance": "Cosine"}});
        self.send(self.client.put(self.collection_url("")).json(&body))
            .await?;
        info!(collection = %self.collection, dimension, "Recreated Qdrant collection");
        Ok(())
    }

    async fn upsert(
        &self,
        points: &[(EmbeddingEntry, AssessmentRecord)],
    ) -> Result<(), VectorStoreError> {
        if points.is_empty() {
            return Ok(());
        }
        let points: Vec<Value> = points
            .iter()
            .map(|(entry, record)| -> Result<Value, serde_json::Error> {
                Ok(json!({
                    "id": entry.point_id(),
                    "vector": entry.vector,
                    "payload": serde_json::to_value(record)?,
                }))
            })
            .collect::<Result<_, serde_json::Error>>()?;
        self.send(
            self.client
                .put(self.collection_url("/points?wait=true"))
                .json(&json!({ "points": points })),
        )
        .await?;
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(f) = qdrant_filter(filter) {
            body["filter"] = f;
        }
        let response = self
            .send(
                self.client
                    .post(self.collection_url("/points/search"))
                    .json(&body),
            )
            .await?;
        let envelope: QdrantEnvelope<Vec<QdrantHit>> =
            response.json().await.map_err(|e| self.map_transport(e))?;
        envelope
            .result
            .into_iter()
            .map(|hit| {
                let payload = hit.payload.unwrap_or(Value::Null);
                Ok(ScoredRecord {
                    record: serde_json::from_value(payload)?,
                    score: hit.score,
                })
            })
            .collect()
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        let response = self
            .send(
                self.client
                    .post(self.collection_url("/points/count"))
                    .json(&json!({"exact": true})),
            )
            .await?;
        let envelope: QdrantEnvelope<QdrantCount> =
            response.json().await.map_err(|e| self.map_transport(e))?;
        Ok(envelope.result.count)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Local JSON file index (brute-force cosine)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LocalIndexData {
    dimension: Option<usize>,
    points: Vec<LocalPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalPoint {
    entry: EmbeddingEntry,
    payload: AssessmentRecord,
}

/// File-backed index for offline use. Every write rewrites the file atomically; reads are
/// served from memory.
pub struct LocalIndex {
    path: Option<PathBuf>,
    data: RwLock<LocalIndexData>,
}

impl LocalIndex {
    /// Opens (or lazily creates) the index file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, VectorStoreError> {
        let path = path.into();
        let data = read_json::<LocalIndexData>(&path)
            .map_err(|e| VectorStoreError::Storage(format!("{e:#}")))?
            .unwrap_or_default();
        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// Purely in-memory index.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(LocalIndexData::default()),
        }
    }

    /// Every stored entry, ordered by assessment id.
    #[cfg(test)]
    pub fn entries(&self) -> Vec<EmbeddingEntry> {
        let mut entries: Vec<EmbeddingEntry> = self
            .read()
            .points
            .iter()
            .map(|p| p.entry.clone())
            .collect();
        entries.sort_by(|a, b| a.assessment_id.cmp(&b.assessment_id));
        entries
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, LocalIndexData> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, LocalIndexData> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, data: &LocalIndexData) -> Result<(), VectorStoreError> {
        match &self.path {
            Some(path) => write_json_atomic(path, data)
                .map_err(|e| VectorStoreError::Storage(format!("{e:#}"))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl VectorIndex for LocalIndex {
    async fn recreate(&self, dimension: usize) -> Result<(), VectorStoreError> {
        let mut data = self.write();
        *data = LocalIndexData {
            dimension: Some(dimension),
            points: Vec::new(),
        };
        self.persist(&data)
    }

    async fn upsert(
        &self,
        points: &[(EmbeddingEntry, AssessmentRecord)],
    ) -> Result<(), VectorStoreError> {
        let mut data = self.write();
        let dimension = data.dimension.ok_or(VectorStoreError::NotBuilt)?;
        for (entry, record) in points {
            if entry.vector.len() != dimension {
                return Err(VectorStoreError::DimensionMismatch {
                    expected: dimension,
                    got: entry.vector.len(),
                });
            }
            let point = LocalPoint {
                entry: entry.clone(),
                payload: record.clone(),
            };
            match data
                .points
                .iter_mut()
                .find(|p| p.entry.assessment_id == entry.assessment_id)
            {
                Some(existing) => *existing = point,
                None => data.points.push(point),
            }
        }
        self.persist(&data)
    }

    async fn search(
        &self,
        vector: &[f32],
        filter: &QueryFilter,
        limit: usize,
    ) -> Result<Vec<ScoredRecord>, VectorStoreError> {
        let data = self.read();
        let dimension = data.dimension.ok_or(VectorStoreError::NotBuilt)?;
        if vector.len() != dimension {
            return Err(VectorStoreError::DimensionMismatch {
                expected: dimension,
                got: vector.len(),
            });
        }

        let mut hits: Vec<ScoredRecord> = data
            .points
            .iter()
            .filter(|p| filter.matches(&p.payload))
            .map(|p| ScoredRecord {
                record: p.payload.clone(),
                score: cosine_similarity(vector, &p.entry.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.record.id.cmp(&b.record.id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize, VectorStoreError> {
        Ok(self.read().points.len())
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
