pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::scoring::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Schema registry
        .route("/api/v1/schemas", get(handlers::handle_list_schemas))
        .route("/api/v1/schemas/:version", get(handlers::handle_get_schema))
        // Scoring
        .route("/api/v1/score", post(handlers::handle_score))
        .route("/api/v1/score/batch", post(handlers::handle_score_batch))
        .with_state(state)
}
