pub mod health;
pub mod ui;

use axum::{
    routing::{get, post},
    Router,
};

use crate::recommend::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/favicon.ico", get(health::favicon_handler))
        // Recommendation API
        .route("/recommend", post(handlers::handle_recommend))
        // Presentation page
        .route("/", get(ui::show_form).post(ui::submit_form))
        .with_state(state)
}
