use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::catalog::fetcher::FetchError;
use crate::indexing::embeddings::EmbeddingError;
use crate::indexing::vector_store::VectorStoreError;
use crate::llm_client::LlmError;
use crate::recommend::extractor::ExtractionError;
use crate::recommend::pipeline::RecommendError;
use crate::recommend::retriever::RetrievalError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Upstream timeout: {0}")]
    Timeout(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Extraction(_) | AppError::Llm(_) | AppError::Fetch(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Embedding(_) | AppError::VectorStore(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to a caller. Upstream detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Validation(msg) => msg.clone(),
            AppError::Extraction(_) => {
                "Could not understand the job description; please rephrase and retry".to_string()
            }
            AppError::Timeout(_) => "An upstream service timed out".to_string(),
            AppError::Llm(_) => "An AI processing error occurred".to_string(),
            AppError::Embedding(_) => "An embedding error occurred".to_string(),
            AppError::VectorStore(_) => "The assessment index is unavailable".to_string(),
            AppError::Fetch(_) => "Could not fetch the job description URL".to_string(),
            AppError::Internal(_) => "An internal server error occurred".to_string(),
        }
    }
}

impl From<LlmError> for AppError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout(_) => AppError::Timeout(e.to_string()),
            other => AppError::Llm(other.to_string()),
        }
    }
}

impl From<FetchError> for AppError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Timeout { .. } => AppError::Timeout(e.to_string()),
            FetchError::InvalidUrl(_) | FetchError::BlockedHost(_) => {
                AppError::Validation(e.to_string())
            }
            other => AppError::Fetch(other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(format!("invalid request body: {}", rejection.body_text()))
    }
}

impl From<EmbeddingError> for AppError {
    fn from(e: EmbeddingError) -> Self {
        match e {
            EmbeddingError::Timeout(_) => AppError::Timeout(e.to_string()),
            other => AppError::Embedding(other.to_string()),
        }
    }
}

impl From<VectorStoreError> for AppError {
    fn from(e: VectorStoreError) -> Self {
        match e {
            VectorStoreError::Timeout(_) => AppError::Timeout(e.to_string()),
            other => AppError::VectorStore(other.to_string()),
        }
    }
}

impl From<ExtractionError> for AppError {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::Fetch(e) => e.into(),
            ExtractionError::EmptyPage(_) => AppError::Validation(e.to_string()),
            ExtractionError::Llm(e) => e.into(),
            ExtractionError::Parse { .. } => AppError::Extraction(e.to_string()),
        }
    }
}

impl From<RetrievalError> for AppError {
    fn from(e: RetrievalError) -> Self {
        match e {
            RetrievalError::Embedding(e) => e.into(),
            RetrievalError::VectorStore(e) => e.into(),
            RetrievalError::NoVector => AppError::Embedding(e.to_string()),
        }
    }
}

impl From<RecommendError> for AppError {
    fn from(e: RecommendError) -> Self {
        match e {
            RecommendError::Extraction(e) => e.into(),
            RecommendError::Retrieval(e) => e.into(),
            RecommendError::Rerank(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Validation(_) => (self.status(), "VALIDATION_ERROR"),
            AppError::Extraction(msg) => {
                tracing::warn!("Extraction error: {msg}");
                (self.status(), "EXTRACTION_ERROR")
            }
            AppError::Timeout(msg) => {
                tracing::error!("Upstream timeout: {msg}");
                (self.status(), "UPSTREAM_TIMEOUT")
            }
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (self.status(), "LLM_ERROR")
            }
            AppError::Embedding(msg) => {
                tracing::error!("Embedding error: {msg}");
                (self.status(), "EMBEDDING_ERROR")
            }
            AppError::VectorStore(msg) => {
                tracing::error!("Vector store error: {msg}");
                (self.status(), "VECTOR_STORE_ERROR")
            }
            AppError::Fetch(msg) => {
                tracing::error!("Fetch error: {msg}");
                (self.status(), "FETCH_ERROR")
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (self.status(), "INTERNAL_ERROR")
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.public_message()
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (
                AppError::Validation("empty".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                ExtractionError::Parse {
                    attempts: 2,
                    message: "bad".into(),
                }
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                LlmError::Timeout(Duration::from_secs(30)).into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                RetrievalError::VectorStore(VectorStoreError::Timeout(Duration::from_secs(5)))
                    .into(),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                RetrievalError::VectorStore(VectorStoreError::NotBuilt).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ExtractionError::Fetch(FetchError::Status {
                    url: "https://jobs.example.com".into(),
                    status: 404,
                })
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                RecommendError::Rerank(LlmError::EmptyContent).into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ExtractionError::Fetch(FetchError::BlockedHost("http://127.0.0.1/".into())).into(),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.status(), expected, "{error}");
        }
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = AppError::Validation("query cannot be empty".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"]["message"], "query cannot be empty");
    }
}
