//! Mock agent backend for integration tests.
//!
//! Serves `GET /stream` as `text/event-stream` fed by the test, and records
//! every `POST /interact` body.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use qconsole_common::ConsoleConfig;

#[derive(Debug, Clone)]
enum Frame {
    Raw(String),
    Close,
}

struct MockState {
    frames: broadcast::Sender<Frame>,
    connections: AtomicUsize,
    last_event_ids: Mutex<Vec<Option<String>>>,
    interactions: Mutex<Vec<Value>>,
}

pub struct MockUpstream {
    addr: SocketAddr,
    state: Arc<MockState>,
    server: JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start() -> anyhow::Result<Self> {
        let (frames, _) = broadcast::channel(64);
        let state = Arc::new(MockState {
            frames,
            connections: AtomicUsize::new(0),
            last_event_ids: Mutex::new(Vec::new()),
            interactions: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/stream", get(stream_handler))
            .route("/interact", post(interact_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Ok(Self { addr, state, server })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Config pointing at this backend, with a short reconnect delay.
    pub fn config(&self) -> ConsoleConfig {
        let mut config = ConsoleConfig::default();
        config.upstream.base_url = self.base_url();
        config.http.retry_ms = 50;
        config
    }

    /// Send one `message` event carrying `value` to every open stream.
    pub fn publish_json(&self, value: &Value) {
        self.publish_raw(&format!("data: {}\n\n", value));
    }

    pub fn publish_raw(&self, text: &str) {
        let _ = self.state.frames.send(Frame::Raw(text.to_string()));
    }

    /// End every open stream response.
    pub fn close_streams(&self) {
        let _ = self.state.frames.send(Frame::Close);
    }

    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    pub async fn wait_for_connections(&self, count: usize) -> bool {
        wait_until(Duration::from_secs(5), || self.connections() >= count).await
    }

    pub fn last_event_ids(&self) -> Vec<Option<String>> {
        self.state.last_event_ids.lock().unwrap().clone()
    }

    pub fn interactions(&self) -> Vec<Value> {
        self.state.interactions.lock().unwrap().clone()
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Poll `condition` every 10 ms until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn stream_handler(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    let last_id = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.last_event_ids.lock().unwrap().push(last_id);

    let rx = state.frames.subscribe();
    state.connections.fetch_add(1, Ordering::SeqCst);

    let body = BroadcastStream::new(rx).map_while(|frame| match frame {
        Ok(Frame::Raw(text)) => Some(Ok::<_, Infallible>(text)),
        Ok(Frame::Close) => None,
        Err(_) => Some(Ok(String::new())),
    });

    (
        [(header::CONTENT_TYPE, "text/event-stream"), (header::CACHE_CONTROL, "no-cache")],
        Body::from_stream(body),
    )
        .into_response()
}

async fn interact_handler(
    State(state): State<Arc<MockState>>,
    Json(payload): Json<Value>,
) -> Response {
    state.interactions.lock().unwrap().push(payload.clone());

    let query = payload.get("query").and_then(Value::as_str).unwrap_or_default();
    if query.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": "Query is required" }))).into_response();
    }

    Json(json!({
        "query_id": payload.get("query_id").cloned().unwrap_or(Value::Null),
        "status": "processing"
    }))
    .into_response()
}
