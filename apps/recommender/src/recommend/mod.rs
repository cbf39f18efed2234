// Request-time pipeline: extract → retrieve → rerank.
pub mod extractor;
pub mod handlers;
pub mod pipeline;
pub mod prompts;
pub mod reranker;
pub mod retriever;

#[cfg(test)]
pub(crate) mod fixtures {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use crate::indexing::embeddings::testing::KeywordEmbedder;
    use crate::indexing::embeddings::RetryPolicy;
    use crate::indexing::indexer::{rebuild_index, IndexSettings};
    use crate::indexing::vector_store::LocalIndex;
    use crate::models::assessment::{AssessmentRecord, SolutionType};

    pub const VOCABULARY: &[&str] = &[
        "cognitive",
        "ability",
        "aptitude",
        "numerical",
        "verbal",
        "reasoning",
        "java",
        "sql",
        "personality",
        "account",
    ];

    pub fn record(
        id: &str,
        name: &str,
        types: &[&str],
        remote: bool,
        duration: Option<u32>,
    ) -> AssessmentRecord {
        AssessmentRecord {
            id: id.to_string(),
            name: name.to_string(),
            url: format!("https://catalog.example.com/view/{id}/"),
            description: format!("{name} assessment."),
            remote_testing: remote,
            adaptive_support: false,
            duration,
            test_types: types.iter().map(|t| t.to_string()).collect::<BTreeSet<_>>(),
            solution_type: SolutionType::Individual,
        }
    }

    pub fn catalog() -> Vec<AssessmentRecord> {
        let mut packaged = record(
            "account-manager-solution",
            "Account Manager Solution",
            &["Ability & Aptitude", "Personality & Behavior"],
            true,
            Some(49),
        );
        packaged.solution_type = SolutionType::Prepackaged;
        packaged.adaptive_support = true;

        vec![
            record(
                "verify-numerical-ability",
                "Verify Numerical Ability",
                &["Ability & Aptitude"],
                true,
                Some(17),
            ),
            record(
                "verify-verbal-ability",
                "Verify Verbal Ability",
                &["Ability & Aptitude"],
                true,
                Some(19),
            ),
            record(
                "verify-g-plus",
                "Verify G+ Cognitive Ability",
                &["Ability & Aptitude"],
                true,
                Some(36),
            ),
            record(
                "inductive-reasoning",
                "Inductive Reasoning Aptitude",
                &["Ability & Aptitude"],
                false,
                Some(25),
            ),
            record("java-8", "Java 8", &["Knowledge & Skills"], true, Some(18)),
            record("sql-server", "SQL Server", &["Knowledge & Skills"], true, None),
            record(
                "opq32r",
                "Occupational Personality Questionnaire",
                &["Personality & Behavior"],
                true,
                Some(25),
            ),
            packaged,
        ]
    }

    pub fn embedder() -> KeywordEmbedder {
        KeywordEmbedder::new(VOCABULARY)
    }

    /// An in-memory index holding [`catalog`], embedded with [`embedder`].
    pub async fn built_index() -> LocalIndex {
        let index = LocalIndex::in_memory();
        let settings = IndexSettings {
            batch_size: 4,
            retry: RetryPolicy {
                max_attempts: 1,
                base_backoff: Duration::from_millis(1),
            },
        };
        rebuild_index(&catalog(), &embedder(), &index, settings)
            .await
            .unwrap();
        index
    }
}
