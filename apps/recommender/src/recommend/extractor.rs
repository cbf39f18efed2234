//! Query Extractor: turns a job description (text or link) into a `StructuredQuery`.

use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::fetcher::{as_http_url, html_to_text, FetchError, PageSource};
use crate::llm_client::prompts::{json_system, render};
use crate::llm_client::{call_json, ChatModel, LlmError};
use crate::models::query::{truncate_chars, ExtractedQuery, StructuredQuery};
use crate::recommend::prompts::{EXTRACT_PROMPT_TEMPLATE, EXTRACT_ROLE};

/// Model calls per extraction: the first attempt plus one retry on a schema mismatch.
const MAX_ATTEMPTS: u32 = 2;

/// Longest slice of job text sent to the model.
const MAX_PROMPT_CHARS: usize = 8000;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("could not fetch job description: {0}")]
    Fetch(#[from] FetchError),

    #[error("page at {0} has no readable text")]
    EmptyPage(String),

    #[error("query extraction call failed: {0}")]
    Llm(#[source] LlmError),

    #[error("model output did not match the query schema after {attempts} attempts: {message}")]
    Parse { attempts: u32, message: String },
}

/// Returns the job text for `input`: the page text when it is a bare http(s) link,
/// otherwise the input itself.
pub async fn resolve_job_text(
    input: &str,
    pages: &dyn PageSource,
) -> Result<String, ExtractionError> {
    let input = input.trim();
    if as_http_url(input).is_none() {
        return Ok(input.to_string());
    }

    let html = pages.fetch(input).await?;
    let text = html_to_text(&html);
    if text.is_empty() {
        return Err(ExtractionError::EmptyPage(input.to_string()));
    }
    debug!(url = input, chars = text.len(), "Resolved job description from URL");
    Ok(text)
}

/// Runs the extraction prompt over `job_text`. A reply that does not match the extraction
/// schema exactly is retried once; transport failures are returned immediately.
pub async fn extract_query(
    job_text: &str,
    llm: &dyn ChatModel,
) -> Result<StructuredQuery, ExtractionError> {
    let excerpt = truncate_chars(job_text, MAX_PROMPT_CHARS);
    let prompt = render(EXTRACT_PROMPT_TEMPLATE, &[("job_text", excerpt.as_str())]);
    let system = json_system(EXTRACT_ROLE);

    let mut last_error = String::new();
    for attempt in 1..=MAX_ATTEMPTS {
        match call_json::<ExtractedQuery>(llm, &prompt, &system).await {
            Ok(reply) => {
                let query = StructuredQuery::from(reply);
                debug!(
                    role = %query.role,
                    skills = query.required_skills.len(),
                    max_duration = ?query.max_duration,
                    "Extracted structured query"
                );
                return Ok(query.with_description(job_text));
            }
            Err(e @ (LlmError::Parse(_) | LlmError::EmptyContent)) => {
                warn!(attempt, model = llm.model_name(), "Extraction reply rejected: {e}");
                last_error = e.to_string();
            }
            Err(e) => return Err(ExtractionError::Llm(e)),
        }
    }

    Err(ExtractionError::Parse {
        attempts: MAX_ATTEMPTS,
        message: last_error,
    })
}
