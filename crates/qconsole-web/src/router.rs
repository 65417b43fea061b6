//! Axum router — maps all URL paths to handlers.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::CorsLayer,
    trace::TraceLayer,
    compression::CompressionLayer,
};
use std::sync::Arc;
use crate::state::{AppState, SharedState};
use crate::handlers::{
    page::{console_page, health},
    api::{set_draft, submit, messages, log_fragment},
};
use crate::sse::sse_handler;

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let shared: SharedState = Arc::new(state);

    Router::new()
        // Pages
        .route("/",            get(console_page))
        .route("/health",      get(health))

        // SSE streaming
        .route("/api/events",  get(sse_handler))

        // API endpoints
        .route("/api/draft",    post(set_draft))
        .route("/api/submit",   post(submit))
        .route("/api/messages", get(messages))
        .route("/api/log",      get(log_fragment))

        // Middleware
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}
