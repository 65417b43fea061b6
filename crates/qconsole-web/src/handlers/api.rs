//! JSON API used by the console page.

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Html;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use qconsole_common::ConsoleError;

use crate::handlers::ApiError;
use crate::log::LogEntry;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct DraftRequest {
    pub query: String,
}

pub async fn set_draft(
    State(state): State<SharedState>,
    Json(payload): Json<DraftRequest>,
) -> Json<Value> {
    state.console.set_query(payload.query);
    Json(json!({ "draft": state.console.draft() }))
}

/// Submit a query; replies with the backend's answer and the draft as it
/// stands afterwards.
///
/// A `{"query": ...}` body is submitted as sent and becomes the draft. An
/// empty body submits the current draft.
pub async fn submit(State(state): State<SharedState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let outcome = if body.iter().all(u8::is_ascii_whitespace) {
        state.console.submit().await?
    } else {
        let payload: DraftRequest = serde_json::from_slice(&body)
            .map_err(|e| ConsoleError::Payload(format!("submit body: {e}")))?;
        state.console.submit_query(payload.query).await?
    };
    Ok(Json(json!({
        "query_id": outcome.query_id,
        "response": outcome.response,
        "draft": state.console.draft(),
    })))
}

pub async fn messages(State(state): State<SharedState>) -> Json<Vec<LogEntry>> {
    Json(state.console.messages())
}

pub async fn log_fragment(State(state): State<SharedState>) -> Result<Html<String>, ApiError> {
    Ok(Html(state.console.render()?))
}
