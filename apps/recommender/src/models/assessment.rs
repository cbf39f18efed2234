use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::test_type::TestType;

/// Catalog section a product was listed under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionType {
    #[default]
    Individual,
    Prepackaged,
}

impl SolutionType {
    /// The `type=` query parameter the catalog uses for this section.
    pub fn catalog_param(self) -> u8 {
        match self {
            SolutionType::Individual => 1,
            SolutionType::Prepackaged => 2,
        }
    }
}

/// One catalog product as written by the crawler.
///
/// Immutable once written; a re-crawl replaces records wholesale by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentRecord {
    /// URL slug of the product page, stable across crawls.
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    pub remote_testing: bool,
    pub adaptive_support: bool,
    /// Approximate completion time in minutes, when the catalog states one.
    #[serde(default)]
    pub duration: Option<u32>,
    /// Full test-type labels, e.g. "Knowledge & Skills".
    #[serde(default)]
    pub test_types: BTreeSet<String>,
    #[serde(default)]
    pub solution_type: SolutionType,
}

impl AssessmentRecord {
    pub fn canonical_test_types(&self) -> BTreeSet<TestType> {
        self.test_types
            .iter()
            .filter_map(|t| TestType::parse(t))
            .collect()
    }

    /// Text submitted to the embedding model. Must stay deterministic so re-indexing an
    /// unchanged catalog produces identical vectors.
    pub fn embedding_text(&self) -> String {
        let test_types: Vec<&str> = self.test_types.iter().map(String::as_str).collect();
        format!(
            "Name: {}\nDescription: {}\nTest Types: {}\nDuration: {}\nRemote Support: {}\nAdaptive Support: {}",
            self.name,
            self.description,
            test_types.join(", "),
            self.duration
                .map(|d| format!("{d} minutes"))
                .unwrap_or_else(|| "unknown".to_string()),
            yes_no(self.remote_testing),
            yes_no(self.adaptive_support),
        )
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

/// Derives a record id from a product URL: the last non-empty path segment.
pub fn slug_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty() && !s.contains(':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AssessmentRecord {
        AssessmentRecord {
            id: "java-8-new".to_string(),
            name: "Java 8 (New)".to_string(),
            url: "https://www.shl.com/solutions/products/product-catalog/view/java-8-new/"
                .to_string(),
            description: "Multi-choice test of Java 8 knowledge.".to_string(),
            remote_testing: true,
            adaptive_support: false,
            duration: Some(18),
            test_types: BTreeSet::from(["Knowledge & Skills".to_string()]),
            solution_type: SolutionType::Individual,
        }
    }

    #[test]
    fn test_slug_from_url_trailing_slash() {
        assert_eq!(
            slug_from_url("https://www.shl.com/solutions/products/product-catalog/view/java-8-new/"),
            Some("java-8-new".to_string())
        );
    }

    #[test]
    fn test_slug_from_url_relative_with_query() {
        assert_eq!(
            slug_from_url("/products/product-catalog/view/OPQ32r/?utm=x"),
            Some("opq32r".to_string())
        );
        assert_eq!(slug_from_url("https://"), None);
    }

    #[test]
    fn test_embedding_text_is_deterministic_and_complete() {
        let r = record();
        let text = r.embedding_text();
        assert_eq!(text, r.clone().embedding_text());
        assert!(text.contains("Name: Java 8 (New)"));
        assert!(text.contains("Duration: 18 minutes"));
        assert!(text.contains("Remote Support: Yes"));
        assert!(text.contains("Adaptive Support: No"));
    }

    #[test]
    fn test_record_missing_optional_fields_deserializes() {
        let json = r#"{
            "id": "opq32r",
            "name": "OPQ32r",
            "url": "https://example.com/opq32r/",
            "remote_testing": true,
            "adaptive_support": true
        }"#;
        let parsed: AssessmentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.duration, None);
        assert!(parsed.test_types.is_empty());
        assert_eq!(parsed.solution_type, SolutionType::Individual);
    }

    #[test]
    fn test_canonical_test_types_skips_unknown_labels() {
        let mut r = record();
        r.test_types.insert("Mystery".to_string());
        assert_eq!(
            r.canonical_test_types(),
            BTreeSet::from([TestType::KnowledgeSkills])
        );
    }
}
