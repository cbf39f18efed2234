//! Retriever: dense similarity search over the vector index.

use std::cmp::Ordering;

use thiserror::Error;
use tracing::debug;

use crate::indexing::embeddings::{EmbeddingError, Embedder};
use crate::indexing::vector_store::{ScoredRecord, VectorIndex, VectorStoreError};
use crate::models::assessment::AssessmentRecord;
use crate::models::query::{QueryFilter, StructuredQuery};

/// Extra hits requested beyond `k` so that score ties at the cut are settled by id here,
/// not by the backend's internal order.
const TIE_MARGIN: usize = 10;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector search failed: {0}")]
    VectorStore(#[from] VectorStoreError),

    #[error("embedding model returned no vector for the query")]
    NoVector,
}

/// Top-`k` records for `query`, most similar first, ties broken by id.
///
/// The query's hard constraints are applied inside the search and re-checked on the hits.
/// Individual solutions are preferred; if none match, the search is repeated across all
/// solution types. `k == 0` returns nothing without touching either service.
pub async fn retrieve(
    query: &StructuredQuery,
    k: usize,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
) -> Result<Vec<ScoredRecord>, RetrievalError> {
    if k == 0 {
        return Ok(Vec::new());
    }
    let text = query.search_text();
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let vector = embed_query(&text, embedder).await?;
    let filter = query.filter();

    let fetch = k.saturating_add(TIE_MARGIN);
    let mut hits = search_checked(index, &vector, &filter, fetch).await?;
    if hits.is_empty() && filter.solution_type.is_some() {
        debug!("No individual solutions matched; widening to all solution types");
        hits = search_checked(index, &vector, &filter.without_solution_type(), fetch).await?;
    }

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.record.id.cmp(&b.record.id))
    });
    hits.truncate(k);
    debug!(k, returned = hits.len(), "Retrieved candidates");
    Ok(hits)
}

/// Vector search on the raw text, skipping extraction and reranking.
pub async fn retrieve_raw(
    text: &str,
    k: usize,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
) -> Result<Vec<AssessmentRecord>, RetrievalError> {
    let query = StructuredQuery::unconstrained(text);
    let hits = retrieve(&query, k, embedder, index).await?;
    Ok(hits.into_iter().map(|hit| hit.record).collect())
}

async fn embed_query(text: &str, embedder: &dyn Embedder) -> Result<Vec<f32>, RetrievalError> {
    let mut vectors = embedder.embed(&[text.to_string()]).await?;
    if vectors.is_empty() {
        return Err(RetrievalError::NoVector);
    }
    Ok(vectors.swap_remove(0))
}

async fn search_checked(
    index: &dyn VectorIndex,
    vector: &[f32],
    filter: &QueryFilter,
    k: usize,
) -> Result<Vec<ScoredRecord>, RetrievalError> {
    let mut hits = index.search(vector, filter, k).await?;
    hits.retain(|hit| filter.matches(&hit.record));
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use async_trait::async_trait;

    use super::*;
    use crate::indexing::vector_store::EmbeddingEntry;
    use crate::recommend::fixtures::{built_index, embedder, record};

    /// Every record scores the same and comes back in descending id order, cut at `limit`.
    struct TiedIndex {
        records: Vec<AssessmentRecord>,
    }

    #[async_trait]
    impl VectorIndex for TiedIndex {
        async fn recreate(&self, _dimension: usize) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn upsert(
            &self,
            _points: &[(EmbeddingEntry, AssessmentRecord)],
        ) -> Result<(), VectorStoreError> {
            Ok(())
        }

        async fn search(
            &self,
            _vector: &[f32],
            _filter: &QueryFilter,
            limit: usize,
        ) -> Result<Vec<ScoredRecord>, VectorStoreError> {
            let mut records = self.records.clone();
            records.sort_by(|a, b| b.id.cmp(&a.id));
            Ok(records
                .into_iter()
                .take(limit)
                .map(|record| ScoredRecord { record, score: 0.5 })
                .collect())
        }

        async fn count(&self) -> Result<usize, VectorStoreError> {
            Ok(self.records.len())
        }
    }

    fn cognitive_query() -> StructuredQuery {
        StructuredQuery {
            preferred_test_types: BTreeSet::from(["cognitive ability".to_string()]),
            remote_testing: Some(true),
            max_duration: Some(30),
            ..StructuredQuery::default()
        }
        .with_description("Looking for a cognitive ability test, remote, under 30 minutes")
    }

    fn ids(hits: &[ScoredRecord]) -> Vec<&str> {
        hits.iter().map(|h| h.record.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_zero_k_makes_no_calls() {
        let embedder = embedder();
        let index = built_index().await;
        let hits = retrieve(&cognitive_query(), 0, &embedder, &index).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(*embedder.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_length_never_exceeds_k() {
        let embedder = embedder();
        let index = built_index().await;
        let query = StructuredQuery::unconstrained("assessment");
        for k in 0..12 {
            let hits = retrieve(&query, k, &embedder, &index).await.unwrap();
            assert!(hits.len() <= k, "k={k} returned {}", hits.len());
        }
    }

    #[tokio::test]
    async fn test_hard_constraints_hold_for_every_hit() {
        let embedder = embedder();
        let index = built_index().await;

        let hits = retrieve(&cognitive_query(), 10, &embedder, &index).await.unwrap();

        assert_eq!(
            ids(&hits),
            vec!["verify-numerical-ability", "verify-verbal-ability"]
        );
        for hit in &hits {
            assert!(hit.record.remote_testing);
            assert!(hit.record.duration.unwrap() <= 30);
            assert!(hit.record.test_types.contains("Ability & Aptitude"));
        }
    }

    #[tokio::test]
    async fn test_results_sorted_by_score_then_id() {
        let embedder = embedder();
        let index = built_index().await;
        let query = StructuredQuery::unconstrained("java");

        let hits = retrieve(&query, 10, &embedder, &index).await.unwrap();

        assert_eq!(hits[0].record.id, "java-8");
        for pair in hits.windows(2) {
            assert!(
                pair[0].score > pair[1].score
                    || (pair[0].score == pair[1].score && pair[0].record.id < pair[1].record.id)
            );
        }
    }

    #[tokio::test]
    async fn test_falls_back_to_prepackaged_when_no_individual_matches() {
        let embedder = embedder();
        let index = built_index().await;
        // only the packaged solution supports adaptive testing
        let query = StructuredQuery {
            adaptive_support: Some(true),
            ..StructuredQuery::default()
        }
        .with_description("account manager");

        let hits = retrieve(&query, 5, &embedder, &index).await.unwrap();

        assert_eq!(ids(&hits), vec!["account-manager-solution"]);
    }

    #[tokio::test]
    async fn test_ties_at_the_cut_are_settled_by_id() {
        let index = TiedIndex {
            records: ["a", "b", "c", "d", "e"]
                .iter()
                .map(|id| record(id, id, &["Knowledge & Skills"], true, Some(10)))
                .collect(),
        };
        let query = StructuredQuery::unconstrained("java");

        let hits = retrieve(&query, 2, &embedder(), &index).await.unwrap();

        assert_eq!(ids(&hits), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_unmapped_test_type_phrase_does_not_empty_results() {
        let embedder = embedder();
        let index = built_index().await;
        let query = StructuredQuery {
            role: "Java Developer".to_string(),
            required_skills: vec!["Java".to_string()],
            preferred_test_types: BTreeSet::from(["Adaptability".to_string()]),
            ..StructuredQuery::default()
        };

        let hits = retrieve(&query, 5, &embedder, &index).await.unwrap();

        assert_eq!(hits[0].record.id, "java-8");
    }

    #[tokio::test]
    async fn test_retrieve_raw_uses_unconstrained_text() {
        let embedder = embedder();
        let index = built_index().await;
        let results = retrieve_raw("java developer", 3, &embedder, &index).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].id, "java-8");
        assert_eq!(*embedder.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unbuilt_index_is_an_error() {
        let embedder = embedder();
        let index = crate::indexing::vector_store::LocalIndex::in_memory();
        let err = retrieve(&cognitive_query(), 5, &embedder, &index)
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::VectorStore(VectorStoreError::NotBuilt)));
    }
}
