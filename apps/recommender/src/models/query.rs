use std::collections::BTreeSet;

use serde::Deserialize;

use crate::models::assessment::{AssessmentRecord, SolutionType};
use crate::models::test_type::TestType;

/// Longest slice of the raw job description carried into the retrieval text.
const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Machine-parsed representation of a job description's requirements.
/// Produced per request by the extractor and consumed by the retriever and reranker.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredQuery {
    pub role: String,
    pub required_skills: Vec<String>,
    pub max_duration: Option<u32>,
    pub preferred_test_types: BTreeSet<String>,
    /// `Some(true)` when the job asks for remotely administered tests.
    pub remote_testing: Option<bool>,
    pub adaptive_support: Option<bool>,
    /// Truncated source text. Filled in by the extractor, never by the model.
    pub description: String,
}

/// The extraction reply exactly as the model must produce it. A reply with missing
/// list/string fields, extra fields or any other JSON shape fails to deserialize.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractedQuery {
    pub role: String,
    pub required_skills: Vec<String>,
    pub max_duration: Option<u32>,
    pub preferred_test_types: Vec<String>,
    pub remote_testing: Option<bool>,
    pub adaptive_support: Option<bool>,
}

impl From<ExtractedQuery> for StructuredQuery {
    fn from(reply: ExtractedQuery) -> Self {
        Self {
            role: reply.role.trim().to_string(),
            required_skills: reply
                .required_skills
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_duration: reply.max_duration,
            preferred_test_types: reply
                .preferred_test_types
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            remote_testing: reply.remote_testing,
            adaptive_support: reply.adaptive_support,
            description: String::new(),
        }
    }
}

impl StructuredQuery {
    /// A query with no constraints: raw text goes straight to vector search.
    pub fn unconstrained(text: &str) -> Self {
        Self {
            description: truncate_chars(text.trim(), MAX_DESCRIPTION_CHARS),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, text: &str) -> Self {
        self.description = truncate_chars(text.trim(), MAX_DESCRIPTION_CHARS);
        self
    }

    /// Preferred test types that map onto the catalog vocabulary. Unknown phrases are
    /// dropped rather than turned into an unsatisfiable filter.
    pub fn canonical_test_types(&self) -> BTreeSet<TestType> {
        self.preferred_test_types
            .iter()
            .filter_map(|t| TestType::parse(t))
            .collect()
    }

    /// Text embedded for similarity search.
    pub fn search_text(&self) -> String {
        let mut parts = Vec::new();
        if !self.role.trim().is_empty() {
            parts.push(format!("Role: {}", self.role.trim()));
        }
        if !self.required_skills.is_empty() {
            parts.push(format!("Skills: {}", self.required_skills.join(", ")));
        }
        if !self.preferred_test_types.is_empty() {
            let types: Vec<&str> = self.preferred_test_types.iter().map(String::as_str).collect();
            parts.push(format!("Test Types: {}", types.join(", ")));
        }
        if let Some(max) = self.max_duration {
            parts.push(format!("Duration: at most {max} minutes"));
        }
        if !self.description.is_empty() {
            parts.push(self.description.clone());
        }
        parts.join("\n")
    }

    /// Hard constraints derived from this query.
    pub fn filter(&self) -> QueryFilter {
        QueryFilter {
            max_duration: self.max_duration,
            remote_testing: self.remote_testing.filter(|r| *r),
            adaptive_support: self.adaptive_support.filter(|a| *a),
            test_types: self.canonical_test_types(),
            solution_type: Some(SolutionType::Individual),
        }
    }
}

/// Constraints applied inside the vector search and re-checked on the results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFilter {
    pub max_duration: Option<u32>,
    pub remote_testing: Option<bool>,
    pub adaptive_support: Option<bool>,
    /// Match if the record carries any of these.
    pub test_types: BTreeSet<TestType>,
    pub solution_type: Option<SolutionType>,
}

impl QueryFilter {
    pub fn without_solution_type(&self) -> Self {
        Self {
            solution_type: None,
            ..self.clone()
        }
    }

    pub fn matches(&self, record: &AssessmentRecord) -> bool {
        if let Some(max) = self.max_duration {
            // unknown duration cannot satisfy a ceiling
            match record.duration {
                Some(d) if d <= max => {}
                _ => return false,
            }
        }
        if let Some(remote) = self.remote_testing {
            if record.remote_testing != remote {
                return false;
            }
        }
        if let Some(adaptive) = self.adaptive_support {
            if record.adaptive_support != adaptive {
                return false;
            }
        }
        if !self.test_types.is_empty() {
            let record_types = record.canonical_test_types();
            if self.test_types.is_disjoint(&record_types) {
                return false;
            }
        }
        if let Some(solution) = self.solution_type {
            if record.solution_type != solution {
                return false;
            }
        }
        true
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
