use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

/// GET /health
/// Returns a simple status object with service version.
pub async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "assessment-recommender"
    }))
}

/// GET /favicon.ico
pub async fn favicon_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}
