//! Axum route handlers for the recommendation API.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::assessment::AssessmentRecord;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

/// Any one of the three fields may carry the job description; the first non-blank wins.
#[derive(Debug, Default, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub job_description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl RecommendRequest {
    pub fn input(&self) -> Option<&str> {
        [&self.query, &self.job_description, &self.url]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub name: String,
    pub url: String,
    pub description: String,
    pub remote_testing: bool,
    pub adaptive_support: bool,
    /// Minutes; `null` when the catalog gives no completion time.
    pub duration: Option<u32>,
    pub test_types: Vec<String>,
}

impl From<AssessmentRecord> for RecommendationItem {
    fn from(record: AssessmentRecord) -> Self {
        Self {
            name: record.name,
            url: record.url,
            description: record.description,
            remote_testing: record.remote_testing,
            adaptive_support: record.adaptive_support,
            duration: record.duration,
            test_types: record.test_types.into_iter().collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub recommended_assessments: Vec<RecommendationItem>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /recommend
///
/// Runs the full pipeline and returns the ranked assessments. Malformed bodies get the
/// same error envelope as every other failure.
pub async fn handle_recommend(
    State(state): State<AppState>,
    payload: Result<Json<RecommendRequest>, JsonRejection>,
) -> Result<Json<RecommendResponse>, AppError> {
    let Json(request) = payload?;
    let Some(input) = request.input() else {
        return Err(AppError::Validation(
            "one of query, job_description or url must be non-empty".to_string(),
        ));
    };

    let records = state.recommender.recommend(input).await?;

    Ok(Json(RecommendResponse {
        recommended_assessments: records.into_iter().map(RecommendationItem::from).collect(),
    }))
}
