//! Embedding Indexer: rebuilds the vector index from the catalog.
//!
//! The collection is recreated from scratch once the first batch yields vectors (the
//! model's dimension is only known then), so a run that cannot embed anything leaves the
//! previous index untouched.

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::indexing::embeddings::{embed_with_retry, Embedder, RetryPolicy};
use crate::indexing::vector_store::{EmbeddingEntry, VectorIndex, VectorStoreError};
use crate::models::assessment::AssessmentRecord;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector index write failed: {0}")]
    VectorStore(#[from] VectorStoreError),
}

#[derive(Debug, Clone, Copy)]
pub struct IndexSettings {
    pub batch_size: usize,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRecord {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub indexed: usize,
    pub skipped: Vec<SkippedRecord>,
    pub dimension: Option<usize>,
}

/// Embeds every record and replaces the index contents.
///
/// Each batch is retried per `settings.retry`; a batch that still fails is split and each
/// record retried on its own, so one bad record costs only itself.
pub async fn rebuild_index(
    records: &[AssessmentRecord],
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    settings: IndexSettings,
) -> Result<IndexReport, IndexError> {
    // one entry per id, deterministic order
    let unique: BTreeMap<&str, &AssessmentRecord> =
        records.iter().map(|r| (r.id.as_str(), r)).collect();
    let unique: Vec<&AssessmentRecord> = unique.into_values().collect();

    let batch_size = settings.batch_size.min(embedder.batch_size()).max(1);
    info!(
        records = unique.len(),
        batch_size,
        model = embedder.model_name(),
        "Rebuilding vector index"
    );

    let mut report = IndexReport::default();

    for batch in unique.chunks(batch_size) {
        let embedded = embed_batch(batch, embedder, settings.retry, &mut report).await;
        if embedded.is_empty() {
            continue;
        }

        let dimension = match report.dimension {
            Some(d) => d,
            None => {
                let d = embedded[0].0.vector.len();
                index.recreate(d).await?;
                report.dimension = Some(d);
                d
            }
        };

        let (points, mismatched): (Vec<_>, Vec<_>) = embedded
            .into_iter()
            .partition(|(entry, _)| entry.vector.len() == dimension);
        for (entry, _) in mismatched {
            warn!(id = %entry.assessment_id, "Skipping vector with unexpected dimension");
            report.skipped.push(SkippedRecord {
                id: entry.assessment_id,
                reason: format!("vector dimension {} != {dimension}", entry.vector.len()),
            });
        }

        index.upsert(&points).await?;
        report.indexed += points.len();
        info!(indexed = report.indexed, total = unique.len(), "Upserted batch");
    }

    if report.dimension.is_none() {
        warn!("No record could be embedded; existing index left unchanged");
    }
    if !report.skipped.is_empty() {
        warn!(skipped = report.skipped.len(), "Some records were not indexed");
    }
    Ok(report)
}

async fn embed_batch(
    batch: &[&AssessmentRecord],
    embedder: &dyn Embedder,
    retry: RetryPolicy,
    report: &mut IndexReport,
) -> Vec<(EmbeddingEntry, AssessmentRecord)> {
    let texts: Vec<String> = batch.iter().map(|r| r.embedding_text()).collect();
    match embed_with_retry(embedder, &texts, retry).await {
        Ok(vectors) => {
            return batch
                .iter()
                .zip(vectors)
                .map(|(record, vector)| entry_for(record, vector))
                .collect();
        }
        Err(e) if batch.len() > 1 => {
            warn!("Batch of {} failed ({e}); embedding records individually", batch.len());
        }
        Err(e) => {
            report.skipped.push(SkippedRecord {
                id: batch[0].id.clone(),
                reason: e.to_string(),
            });
            return Vec::new();
        }
    }

    let mut embedded = Vec::with_capacity(batch.len());
    for (record, text) in batch.iter().zip(texts) {
        match embed_with_retry(embedder, std::slice::from_ref(&text), retry).await {
            Ok(mut vectors) if vectors.len() == 1 => {
                embedded.push(entry_for(record, vectors.remove(0)));
            }
            Ok(vectors) => report.skipped.push(SkippedRecord {
                id: record.id.clone(),
                reason: format!("expected 1 vector, got {}", vectors.len()),
            }),
            Err(e) => {
                warn!(id = %record.id, "Skipping record: {e}");
                report.skipped.push(SkippedRecord {
                    id: record.id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    embedded
}

fn entry_for(record: &AssessmentRecord, vector: Vec<f32>) -> (EmbeddingEntry, AssessmentRecord) {
    (
        EmbeddingEntry {
            assessment_id: record.id.clone(),
            vector,
        },
        (*record).clone(),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use super::*;
    use crate::indexing::embeddings::testing::KeywordEmbedder;
    use crate::indexing::vector_store::LocalIndex;
    use crate::models::assessment::SolutionType;

    fn record(id: &str, name: &str) -> AssessmentRecord {
        AssessmentRecord {
            id: id.to_string(),
            name: name.to_string(),
            url: format!("https://example.com/view/{id}/"),
            description: format!("{name} assessment"),
            remote_testing: true,
            adaptive_support: false,
            duration: Some(15),
            test_types: BTreeSet::from(["Knowledge & Skills".to_string()]),
            solution_type: SolutionType::Individual,
        }
    }

    fn catalog() -> Vec<AssessmentRecord> {
        vec![
            record("java-8", "Java 8"),
            record("python", "Python"),
            record("sql", "SQL Server"),
            record("excel", "Microsoft Excel"),
            record("opq", "Personality questionnaire"),
            // duplicate id: one entry only
            record("python", "Python"),
        ]
    }

    fn settings() -> IndexSettings {
        IndexSettings {
            batch_size: 2,
            retry: RetryPolicy {
                max_attempts: 2,
                base_backoff: Duration::from_millis(1),
            },
        }
    }

    fn embedder() -> KeywordEmbedder {
        KeywordEmbedder::new(&["java", "python", "sql", "excel", "personality"])
    }

    #[tokio::test]
    async fn test_every_record_gets_one_entry() {
        let index = LocalIndex::in_memory();
        let report = rebuild_index(&catalog(), &embedder(), &index, settings())
            .await
            .unwrap();

        assert_eq!(report.indexed, 5);
        assert!(report.skipped.is_empty());
        assert_eq!(report.dimension, Some(6));
        let ids: Vec<String> = index.entries().into_iter().map(|e| e.assessment_id).collect();
        assert_eq!(ids, vec!["excel", "java-8", "opq", "python", "sql"]);
    }

    #[tokio::test]
    async fn test_reindexing_unchanged_catalog_is_idempotent() {
        let index = LocalIndex::in_memory();
        rebuild_index(&catalog(), &embedder(), &index, settings())
            .await
            .unwrap();
        let first = index.entries();

        rebuild_index(&catalog(), &embedder(), &index, settings())
            .await
            .unwrap();
        assert_eq!(index.entries(), first);
    }

    #[tokio::test]
    async fn test_failing_record_is_retried_then_skipped() {
        let mut embedder = embedder();
        embedder.poisoned.insert("Name: Python");
        let index = LocalIndex::in_memory();

        let report = rebuild_index(&catalog(), &embedder, &index, settings())
            .await
            .unwrap();

        assert_eq!(report.indexed, 4);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].id, "python");
        // its batch partner still made it in
        assert!(index.entries().iter().any(|e| e.assessment_id == "opq"));
    }

    #[tokio::test]
    async fn test_nothing_embedded_leaves_index_untouched() {
        let index = LocalIndex::in_memory();
        rebuild_index(&catalog(), &embedder(), &index, settings())
            .await
            .unwrap();

        let mut broken = embedder();
        broken.poisoned.insert("Name:");
        let report = rebuild_index(&catalog(), &broken, &index, settings())
            .await
            .unwrap();

        assert_eq!(report.indexed, 0);
        assert_eq!(report.skipped.len(), 5);
        assert_eq!(index.count().await.unwrap(), 5);
    }
}
