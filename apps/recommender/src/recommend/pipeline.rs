//! Recommendation pipeline: resolve input → extract → retrieve → rerank.
//!
//! Every stage runs in sequence on the caller's task. A failure anywhere fails the whole
//! call; there is no partial result.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::catalog::fetcher::PageSource;
use crate::config::Config;
use crate::indexing::embeddings::Embedder;
use crate::indexing::vector_store::VectorIndex;
use crate::llm_client::{ChatModel, LlmError};
use crate::models::assessment::AssessmentRecord;
use crate::recommend::extractor::{extract_query, resolve_job_text, ExtractionError};
use crate::recommend::reranker::{rerank, RerankSettings};
use crate::recommend::retriever::{retrieve, RetrievalError};

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error("rerank call failed: {0}")]
    Rerank(#[source] LlmError),
}

#[derive(Debug, Clone, Copy)]
pub struct RecommendSettings {
    /// Candidates pulled from the index before reranking.
    pub candidate_pool: usize,
    pub result_limit: usize,
    pub min_results: usize,
}

impl RecommendSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            candidate_pool: config.candidate_pool,
            result_limit: config.result_limit,
            min_results: config.min_results,
        }
    }
}

/// Long-lived handles for every external service the pipeline talks to.
/// Built once at startup and shared behind an `Arc`.
pub struct Recommender {
    llm: Arc<dyn ChatModel>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    pages: Arc<dyn PageSource>,
    settings: RecommendSettings,
}

impl Recommender {
    pub fn new(
        llm: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        pages: Arc<dyn PageSource>,
        settings: RecommendSettings,
    ) -> Self {
        Self {
            llm,
            embedder,
            index,
            pages,
            settings,
        }
    }

    pub fn settings(&self) -> RecommendSettings {
        self.settings
    }

    /// Full pipeline for free text or a job-posting URL.
    pub async fn recommend(&self, input: &str) -> Result<Vec<AssessmentRecord>, RecommendError> {
        let job_text = resolve_job_text(input, self.pages.as_ref()).await?;
        let query = extract_query(&job_text, self.llm.as_ref()).await?;

        let candidates = retrieve(
            &query,
            self.settings.candidate_pool,
            self.embedder.as_ref(),
            self.index.as_ref(),
        )
        .await?;
        info!(candidates = candidates.len(), "Retrieved candidates for reranking");

        let ranked = rerank(
            &query.search_text(),
            candidates.into_iter().map(|hit| hit.record).collect(),
            self.llm.as_ref(),
            RerankSettings {
                limit: self.settings.result_limit,
                min_results: self.settings.min_results,
            },
        )
        .await
        .map_err(RecommendError::Rerank)?;

        info!(results = ranked.len(), "Recommendation complete");
        Ok(ranked)
    }
}
