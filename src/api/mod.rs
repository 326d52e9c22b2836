//! API module
//!
//! HTTP API endpoints, middleware and the response envelope.

pub mod middleware;
pub mod response;
pub mod routes;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

pub use response::{ApiResponse, ErrorBody};
pub use routes::{create_router, AppState};

/// Room for multipart boundaries and the text fields next to the image
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    // Layers run outermost-last: trace -> principal -> logging -> handler
    let api_routes = create_router()
        .layer(axum::middleware::from_fn(middleware::logging_middleware))
        .layer(axum::middleware::from_fn(middleware::principal_middleware))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        // Health check (no principal)
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
