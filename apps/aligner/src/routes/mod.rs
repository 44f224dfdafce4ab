pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::alignment::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Alignment API
        .route("/api/v1/analysis", post(handlers::handle_analysis))
        .route("/api/v1/cover-letter", post(handlers::handle_cover_letter))
        .route(
            "/api/v1/tailored-bullets",
            post(handlers::handle_tailored_bullets),
        )
        .route("/api/v1/grounding/verify", post(handlers::handle_verify))
        // Cache API
        .route(
            "/api/v1/cache/invalidate",
            post(handlers::handle_invalidate),
        )
        .route("/api/v1/cache/stats", get(handlers::handle_cache_stats))
        .with_state(state)
}
