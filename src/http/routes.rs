//! HTTP API Route Definitions

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, AppState};

/// Create the API router with all routes
pub fn create_router(app_state: AppState) -> Router {
    let api_v1 = Router::new()
        .route("/health", get(handlers::health))
        .route("/search", get(handlers::search))
        .route("/search/advanced", post(handlers::search_advanced))
        .route("/status", get(handlers::status))
        .route("/reindex", post(handlers::reindex))
        .with_state(app_state);

    // Mount under /api/v1
    Router::new().nest("/api/v1", api_v1)
}
