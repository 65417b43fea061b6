//! Console page and health check.

use axum::extract::State;
use axum::response::Html;
use axum::Json;
use serde_json::{json, Value};

use crate::handlers::ApiError;
use crate::state::SharedState;

pub async fn console_page(State(state): State<SharedState>) -> Result<Html<String>, ApiError> {
    Ok(Html(state.console.render_page()?))
}

pub async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "mounted": state.console.is_mounted(),
        "messages": state.console.len(),
    }))
}
