//! Reranker: one LLM call that reorders and trims the retrieved candidates.
//!
//! The model answers with a JSON array of 1-based candidate numbers. Anything it returns
//! that does not map onto a candidate is dropped; if nothing maps at all, retrieval order
//! stands.

use std::collections::HashSet;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm_client::prompts::{json_system, render};
use crate::llm_client::{strip_json_fences, ChatModel, LlmError};
use crate::models::assessment::AssessmentRecord;
use crate::models::query::truncate_chars;
use crate::recommend::prompts::{
    RERANK_CANDIDATE_TEMPLATE, RERANK_PROMPT_TEMPLATE, RERANK_ROLE,
};

/// Description excerpt shown per candidate in the prompt.
const MAX_CANDIDATE_DESCRIPTION_CHARS: usize = 300;

/// The model's reply could not be turned into a candidate ordering.
#[derive(Debug, Error, PartialEq)]
pub enum RerankMappingError {
    #[error("reply is not JSON: {0}")]
    NotJson(String),

    #[error("reply is not a JSON array")]
    NotAnArray,

    #[error("reply names no valid candidate")]
    NoValidCandidates,
}

#[derive(Debug, Clone, Copy)]
pub struct RerankSettings {
    /// Most results returned.
    pub limit: usize,
    /// Results are topped up from retrieval order to at least this many (capped by `limit`).
    pub min_results: usize,
}

/// Reorders `candidates` for `query_text`.
///
/// Only the model call itself can fail; a reply that does not map falls back to the
/// candidates in their given order.
pub async fn rerank(
    query_text: &str,
    candidates: Vec<AssessmentRecord>,
    llm: &dyn ChatModel,
    settings: RerankSettings,
) -> Result<Vec<AssessmentRecord>, LlmError> {
    if candidates.is_empty() || settings.limit == 0 {
        return Ok(Vec::new());
    }

    let prompt = build_prompt(query_text, &candidates, settings.limit);
    let reply = llm.complete(&prompt, &json_system(RERANK_ROLE)).await?;

    let order = match map_selection(&reply, &candidates) {
        Ok(selected) => {
            debug!(selected = selected.len(), "Rerank reply mapped");
            fill_selection(selected, candidates.len(), settings)
        }
        Err(e) => {
            warn!("Rerank reply unusable, keeping retrieval order: {e}");
            (0..candidates.len().min(settings.limit)).collect()
        }
    };

    let mut slots: Vec<Option<AssessmentRecord>> = candidates.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

fn build_prompt(query_text: &str, candidates: &[AssessmentRecord], limit: usize) -> String {
    let blocks: Vec<String> = candidates
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let index = (i + 1).to_string();
            let description = truncate_chars(&record.description, MAX_CANDIDATE_DESCRIPTION_CHARS);
            let test_types: Vec<&str> = record.test_types.iter().map(String::as_str).collect();
            let test_types = test_types.join(", ");
            let duration = record
                .duration
                .map(|d| format!("{d} minutes"))
                .unwrap_or_else(|| "unknown".to_string());
            render(
                RERANK_CANDIDATE_TEMPLATE,
                &[
                    ("index", index.as_str()),
                    ("name", record.name.as_str()),
                    ("description", description.as_str()),
                    ("test_types", test_types.as_str()),
                    ("duration", duration.as_str()),
                ],
            )
        })
        .collect();

    let limit = limit.to_string();
    let assessments = blocks.join("\n\n");
    render(
        RERANK_PROMPT_TEMPLATE,
        &[
            ("query", query_text),
            ("limit", limit.as_str()),
            ("assessments", assessments.as_str()),
        ],
    )
}

/// Maps the model reply onto zero-based candidate positions, in reply order.
///
/// Entries may be 1-based numbers (as JSON numbers or numeric strings) or candidate ids.
/// Out-of-range, unknown and repeated entries are dropped.
pub fn map_selection(
    reply: &str,
    candidates: &[AssessmentRecord],
) -> Result<Vec<usize>, RerankMappingError> {
    let value: Value = serde_json::from_str(strip_json_fences(reply))
        .map_err(|e| RerankMappingError::NotJson(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(RerankMappingError::NotAnArray);
    };

    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    for item in &items {
        let Some(position) = position_of(item, candidates) else {
            continue;
        };
        if seen.insert(position) {
            selected.push(position);
        }
    }

    if selected.is_empty() {
        return Err(RerankMappingError::NoValidCandidates);
    }
    Ok(selected)
}

fn position_of(item: &Value, candidates: &[AssessmentRecord]) -> Option<usize> {
    let one_based = match item {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => match s.trim().parse::<u64>() {
            Ok(n) => Some(n),
            Err(_) => {
                let wanted = s.trim();
                return candidates.iter().position(|c| c.id.eq_ignore_ascii_case(wanted));
            }
        },
        _ => None,
    }?;
    let index = usize::try_from(one_based).ok()?.checked_sub(1)?;
    (index < candidates.len()).then_some(index)
}

/// Caps the model's picks at `limit`, then tops up from retrieval order to `min_results`.
fn fill_selection(mut selected: Vec<usize>, available: usize, settings: RerankSettings) -> Vec<usize> {
    selected.truncate(settings.limit);
    let floor = settings.min_results.min(settings.limit).min(available);
    let mut next = 0;
    while selected.len() < floor {
        if !selected.contains(&next) {
            selected.push(next);
        }
        next += 1;
    }
    selected
}
