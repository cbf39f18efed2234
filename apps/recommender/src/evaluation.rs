//! Offline evaluation against labelled queries, and batch predictions for unlabelled ones.

use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{info, warn};

use crate::indexing::embeddings::Embedder;
use crate::indexing::vector_store::VectorIndex;
use crate::recommend::pipeline::{RecommendError, Recommender};
use crate::recommend::retriever::{retrieve_raw, RetrievalError};

#[derive(Debug, Clone, Deserialize)]
pub struct LabelledQuery {
    pub query: String,
    #[serde(default)]
    pub relevant_urls: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnlabelledQuery {
    pub query: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryRecall {
    pub query: String,
    pub recall: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub k: usize,
    pub per_query: Vec<QueryRecall>,
    pub mean_recall: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRow {
    pub query: String,
    pub url: String,
}

/// Reads a JSON array of queries (`train.json` / `test.json` shape).
pub fn load_queries<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}

/// Comparison form of a URL: no trailing slashes, lowercase.
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_lowercase()
}

/// Fraction of the distinct relevant URLs found in the first `k` predictions.
/// No relevant URLs scores 0.
pub fn recall_at_k(predicted: &[String], relevant: &[String], k: usize) -> f64 {
    let relevant: HashSet<String> = relevant.iter().map(|u| normalize_url(u)).collect();
    if relevant.is_empty() {
        return 0.0;
    }
    let predicted: HashSet<String> = predicted.iter().take(k).map(|u| normalize_url(u)).collect();
    predicted.intersection(&relevant).count() as f64 / relevant.len() as f64
}

/// Recall@k of raw vector retrieval (no extraction, no rerank) over `queries`.
pub async fn evaluate(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    queries: &[LabelledQuery],
    k: usize,
) -> Result<EvaluationReport, RetrievalError> {
    let mut per_query = Vec::with_capacity(queries.len());
    for item in queries {
        let records = retrieve_raw(&item.query, k, embedder, index).await?;
        let predicted: Vec<String> = records.into_iter().map(|r| r.url).collect();
        let recall = recall_at_k(&predicted, &item.relevant_urls, k);
        info!(query = %item.query, recall = %format!("{recall:.3}"), "Recall@{k}");
        per_query.push(QueryRecall {
            query: item.query.clone(),
            recall,
        });
    }

    let mean_recall = if per_query.is_empty() {
        0.0
    } else {
        per_query.iter().map(|q| q.recall).sum::<f64>() / per_query.len() as f64
    };
    Ok(EvaluationReport {
        k,
        per_query,
        mean_recall,
    })
}

/// Runs the full pipeline per query and returns one row per distinct non-empty URL, in
/// ranked order. Blank queries are skipped.
pub async fn predict(
    recommender: &Recommender,
    queries: &[UnlabelledQuery],
) -> Result<Vec<PredictionRow>, RecommendError> {
    let floor = recommender.settings().min_results.min(recommender.settings().result_limit);
    let mut rows = Vec::new();
    for item in queries {
        let query = item.query.trim();
        if query.is_empty() {
            warn!("Skipping blank query");
            continue;
        }

        let records = recommender.recommend(query).await?;
        let mut seen = HashSet::new();
        let urls: Vec<String> = records
            .into_iter()
            .map(|r| r.url.trim().to_string())
            .filter(|u| !u.is_empty() && seen.insert(u.clone()))
            .collect();
        if urls.len() < floor {
            warn!(query, found = urls.len(), "Fewer recommendations than expected");
        }

        rows.extend(urls.into_iter().map(|url| PredictionRow {
            query: item.query.clone(),
            url,
        }));
    }
    Ok(rows)
}

/// Writes `Query,Assessment_url` CSV with RFC 4180 quoting.
pub fn write_predictions_csv<W: Write>(rows: &[PredictionRow], mut out: W) -> std::io::Result<()> {
    writeln!(out, "Query,Assessment_url")?;
    for row in rows {
        writeln!(out, "{},{}", csv_field(&row.query), csv_field(&row.url))?;
    }
    out.flush()
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::catalog::fetcher::testing::StaticPages;
    use crate::llm_client::testing::ScriptedModel;
    use crate::recommend::fixtures::{built_index, embedder};
    use crate::recommend::pipeline::RecommendSettings;

    fn urls(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    async fn recommender(replies: &[&str]) -> Recommender {
        Recommender::new(
            Arc::new(ScriptedModel::replying(replies)),
            Arc::new(embedder()),
            Arc::new(built_index().await),
            Arc::new(StaticPages::default()),
            RecommendSettings {
                candidate_pool: 20,
                result_limit: 5,
                min_results: 5,
            },
        )
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(
            normalize_url(" https://Catalog.Example.com/View/Java-8// "),
            "https://catalog.example.com/view/java-8"
        );
    }

    #[test]
    fn test_recall_at_k() {
        let predicted = urls(&["https://x.com/a/", "https://x.com/B", "https://x.com/c"]);
        let relevant = urls(&["https://x.com/a", "https://x.com/b/", "https://x.com/d"]);
        assert!((recall_at_k(&predicted, &relevant, 10) - 2.0 / 3.0).abs() < 1e-9);
        assert!((recall_at_k(&predicted, &relevant, 1) - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(recall_at_k(&predicted, &[], 10), 0.0);
        assert_eq!(recall_at_k(&[], &relevant, 10), 0.0);
    }

    #[test]
    fn test_csv_quoting() {
        let rows = vec![
            PredictionRow {
                query: "Java dev, \"senior\"".to_string(),
                url: "https://x.com/java-8/".to_string(),
            },
            PredictionRow {
                query: "SQL".to_string(),
                url: "https://x.com/sql/".to_string(),
            },
        ];
        let mut out = Vec::new();
        write_predictions_csv(&rows, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Query,Assessment_url\n\
             \"Java dev, \"\"senior\"\"\",https://x.com/java-8/\n\
             SQL,https://x.com/sql/\n"
        );
    }

    #[tokio::test]
    async fn test_evaluate_needs_no_chat_model() {
        let embedder = embedder();
        let index = built_index().await;
        let queries = vec![
            LabelledQuery {
                query: "java".to_string(),
                relevant_urls: urls(&["https://catalog.example.com/view/java-8"]),
            },
            LabelledQuery {
                query: "personality".to_string(),
                relevant_urls: urls(&["https://catalog.example.com/view/missing/"]),
            },
        ];

        let report = evaluate(&embedder, &index, &queries, 3).await.unwrap();

        assert_eq!(report.per_query[0].recall, 1.0);
        assert_eq!(report.per_query[1].recall, 0.0);
        assert!((report.mean_recall - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_predict_rows_follow_ranked_order() {
        let extracted = r#"{"role": "", "required_skills": [], "max_duration": 30,
            "preferred_test_types": ["cognitive ability"], "remote_testing": true}"#;
        let recommender = recommender(&[extracted, "[2, 1]"]).await;
        let queries = vec![
            UnlabelledQuery {
                query: "cognitive ability, remote, under 30 minutes".to_string(),
            },
            UnlabelledQuery {
                query: "   ".to_string(),
            },
        ];

        let rows = predict(&recommender, &queries).await.unwrap();

        let got: Vec<&str> = rows.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            got,
            vec![
                "https://catalog.example.com/view/verify-verbal-ability/",
                "https://catalog.example.com/view/verify-numerical-ability/",
            ]
        );
    }

    #[test]
    fn test_load_queries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json");
        std::fs::write(
            &path,
            r#"[{"query": "java", "relevant_urls": ["https://x.com/a"]}, {"query": "sql"}]"#,
        )
        .unwrap();
        let queries: Vec<LabelledQuery> = load_queries(&path).unwrap();
        assert_eq!(queries.len(), 2);
        assert!(queries[1].relevant_urls.is_empty());
    }
}
