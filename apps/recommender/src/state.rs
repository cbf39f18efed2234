use std::sync::Arc;

use crate::recommend::pipeline::Recommender;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Long-lived LLM, embedding, vector index and page clients behind the pipeline.
    pub recommender: Arc<Recommender>,
}
