//! The Query Console component.
//!
//! Owns the draft query, the message log and the upstream stream
//! subscription. Handles are cheap clones of one shared component.
//!
//! Lifecycle is mounted (stream open) or unmounted (stream closed). Appends
//! check the mount generation under the state lock, so once `unmount`
//! returns no further entry can land in the log.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use qconsole_client::{InteractRequest, UpstreamClient};
use qconsole_common::config::ConsoleSection;
use qconsole_common::{ConsoleConfig, QueryIdPolicy, Record, Result};

use crate::log::{LogEntry, MessageLog};
use crate::render::Renderer;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Result of a successful submit.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub query_id: String,
    pub response: Value,
}

#[derive(Clone)]
pub struct QueryConsole {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<ConsoleState>,
    client: UpstreamClient,
    settings: ConsoleSection,
    renderer: Renderer,
    /// New log entries, pushed to page subscribers
    event_tx: broadcast::Sender<LogEntry>,
}

// The stream task only holds a `Weak`; the last handle going away closes it.
impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(task) = state.task.take() {
            task.abort();
        }
    }
}

struct ConsoleState {
    draft: String,
    log: MessageLog,
    mounted: bool,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl QueryConsole {
    pub fn new(config: &ConsoleConfig) -> Result<Self> {
        let client = UpstreamClient::new(config.upstream.clone(), config.http.clone())?;
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = ConsoleState {
            draft: String::new(),
            log: MessageLog::new(config.log.max_entries),
            mounted: false,
            generation: 0,
            task: None,
        };
        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                client,
                settings: config.console.clone(),
                renderer: Renderer::new()?,
                event_tx,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, ConsoleState> {
        self.inner.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Draft ────────────────────────────────────────────────────────────────

    pub fn set_query(&self, text: impl Into<String>) {
        self.state().draft = text.into();
    }

    pub fn draft(&self) -> String {
        self.state().draft.clone()
    }

    /// POST the draft to the backend.
    ///
    /// The reply is logged and returned; failures are logged and returned.
    /// The draft is kept unless `clear_draft_on_submit` is set.
    pub async fn submit(&self) -> Result<SubmitOutcome> {
        let query = self.draft();
        self.submit_query(query).await
    }

    /// Replace the draft with `query` and submit exactly that text.
    pub async fn submit_query(&self, query: impl Into<String>) -> Result<SubmitOutcome> {
        let query = query.into();
        self.set_query(query.clone());
        let request = InteractRequest { query, query_id: self.next_query_id() };
        info!(query_id = %request.query_id, "Submitting query");

        match self.inner.client.interact(&request).await {
            Ok(response) => {
                info!(query_id = %request.query_id, response = %response, "Response");
                if self.inner.settings.clear_draft_on_submit {
                    let mut state = self.state();
                    // keep edits typed while the request was in flight
                    if state.draft == request.query {
                        state.draft.clear();
                    }
                }
                Ok(SubmitOutcome { query_id: request.query_id, response })
            }
            Err(e) => {
                error!(query_id = %request.query_id, error = %e, "Error");
                Err(e)
            }
        }
    }

    fn next_query_id(&self) -> String {
        match self.inner.settings.query_id {
            QueryIdPolicy::PerRequest => Uuid::new_v4().to_string(),
            QueryIdPolicy::Fixed => self.inner.settings.fixed_query_id.clone(),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Open the upstream event stream. No-op when already mounted.
    pub fn mount(&self) {
        let mut state = self.state();
        if state.mounted {
            return;
        }
        state.mounted = true;
        state.generation += 1;
        let generation = state.generation;

        let stream = self.inner.client.event_stream();
        info!(url = %stream.url(), "Query console mounted");
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        state.task = Some(tokio::spawn(async move {
            stream
                .run(|event| match weak.upgrade() {
                    Some(inner) => QueryConsole { inner }.receive(generation, &event.data),
                    None => ControlFlow::Break(()),
                })
                .await;
        }));
    }

    /// Close the event stream. No-op when not mounted.
    pub fn unmount(&self) {
        let task = {
            let mut state = self.state();
            if !state.mounted {
                return;
            }
            state.mounted = false;
            state.task.take()
        };
        if let Some(task) = task {
            task.abort();
        }
        info!("Query console unmounted");
    }

    pub fn is_mounted(&self) -> bool {
        self.state().mounted
    }

    // ── Log ──────────────────────────────────────────────────────────────────

    /// Append one event payload as if it arrived on the stream.
    ///
    /// Returns `Ok(None)` when the console is unmounted.
    pub fn ingest(&self, data: &str) -> Result<Option<LogEntry>> {
        let (raw, record) = Record::decode(data)?;
        let mut state = self.state();
        if !state.mounted {
            return Ok(None);
        }
        Ok(Some(self.append(&mut state, raw, record)))
    }

    fn receive(&self, generation: u64, data: &str) -> ControlFlow<()> {
        let (raw, record) = match Record::decode(data) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(error = %e, data = %preview(data), "Dropping malformed event");
                return ControlFlow::Continue(());
            }
        };

        let mut state = self.state();
        if !state.mounted || state.generation != generation {
            return ControlFlow::Break(());
        }
        self.append(&mut state, raw, record);
        ControlFlow::Continue(())
    }

    fn append(&self, state: &mut ConsoleState, raw: String, record: Record) -> LogEntry {
        let entry = state.log.push(raw, record);
        debug!(seq = entry.seq, image = entry.record.is_image(), "Event appended");
        // no subscribers is fine
        let _ = self.inner.event_tx.send(entry.clone());
        entry
    }

    pub fn len(&self) -> usize {
        self.state().log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().log.is_empty()
    }

    pub fn messages(&self) -> Vec<LogEntry> {
        self.state().log.entries()
    }

    /// Entries with a sequence number above `seq`.
    pub fn entries_after(&self, seq: u64) -> Vec<LogEntry> {
        self.state().log.after(seq)
    }

    pub fn last_seq(&self) -> u64 {
        self.state().log.last_seq()
    }

    /// Subscribe to new entries, plus a snapshot of those after `seq`.
    ///
    /// Both are taken under the same lock so no entry is missed or repeated.
    pub fn subscribe_after(&self, seq: u64) -> (Vec<LogEntry>, broadcast::Receiver<LogEntry>) {
        let state = self.state();
        let rx = self.inner.event_tx.subscribe();
        (state.log.after(seq), rx)
    }

    // ── Rendering ────────────────────────────────────────────────────────────

    pub fn render(&self) -> Result<String> {
        let entries = self.messages();
        self.inner.renderer.render_log(&entries)
    }

    pub fn render_entry(&self, entry: &LogEntry) -> Result<String> {
        self.inner.renderer.render_entry(entry)
    }

    pub fn render_page(&self) -> Result<String> {
        let (draft, entries, last_seq) = {
            let state = self.state();
            (state.draft.clone(), state.log.entries(), state.log.last_seq())
        };
        let clear_draft = self.inner.settings.clear_draft_on_submit;
        self.inner.renderer.render_page(&draft, &entries, last_seq, clear_draft)
    }
}

fn preview(data: &str) -> &str {
    match data.char_indices().nth(200) {
        Some((idx, _)) => &data[..idx],
        None => data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn offline_config() -> ConsoleConfig {
        let mut config = ConsoleConfig::default();
        // discard port: connections are refused
        config.upstream.base_url = "http://127.0.0.1:9".to_string();
        config.http.retry_ms = 50;
        config
    }

    #[test]
    fn test_set_query_replaces_draft() {
        let console = QueryConsole::new(&offline_config()).unwrap();
        for text in ["hello", "", "multi\nline", "ünïcödé ✓"] {
            console.set_query(text);
            assert_eq!(console.draft(), text);
        }
    }

    #[test]
    fn test_ingest_requires_mount() {
        let console = QueryConsole::new(&offline_config()).unwrap();
        assert_eq!(console.ingest(r#"{"value": 42}"#).unwrap(), None);
        assert!(console.is_empty());
    }

    #[tokio::test]
    async fn test_generic_event_renders_line() {
        let console = QueryConsole::new(&offline_config()).unwrap();
        console.mount();
        let entry = console.ingest(r#"{"value": 42}"#).unwrap().unwrap();
        assert_eq!(entry.seq, 1);
        assert_eq!(console.len(), 1);
        assert!(console.render().unwrap().contains("value: 42"));
        console.unmount();
    }

    #[tokio::test]
    async fn test_unmount_stops_appends() {
        let console = QueryConsole::new(&offline_config()).unwrap();
        console.mount();
        console.ingest(r#"{"n": 1}"#).unwrap();
        console.unmount();
        assert!(!console.is_mounted());
        assert_eq!(console.ingest(r#"{"n": 2}"#).unwrap(), None);
        assert_eq!(console.receive(1, r#"{"n": 3}"#), ControlFlow::Break(()));
        assert_eq!(console.len(), 1);
    }

    #[tokio::test]
    async fn test_stale_stream_generation_is_ignored() {
        let console = QueryConsole::new(&offline_config()).unwrap();
        console.mount();
        console.unmount();
        console.mount();
        assert_eq!(console.receive(1, r#"{"n": 1}"#), ControlFlow::Break(()));
        assert_eq!(console.receive(2, r#"{"n": 2}"#), ControlFlow::Continue(()));
        assert_eq!(console.len(), 1);
        console.unmount();
    }

    #[tokio::test]
    async fn test_malformed_event_is_dropped() {
        let console = QueryConsole::new(&offline_config()).unwrap();
        console.mount();
        assert_eq!(console.receive(1, "not json"), ControlFlow::Continue(()));
        assert!(console.ingest("[1, 2]").is_err());
        assert!(console.is_empty());
        console.unmount();
    }

    #[tokio::test]
    async fn test_subscribe_after_snapshot() {
        let console = QueryConsole::new(&offline_config()).unwrap();
        console.mount();
        console.ingest(r#"{"n": 1}"#).unwrap();
        console.ingest(r#"{"n": 2}"#).unwrap();
        let (backlog, mut rx) = console.subscribe_after(1);
        assert_eq!(backlog.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![2]);
        console.ingest(r#"{"n": 3}"#).unwrap();
        assert_eq!(rx.recv().await.unwrap().seq, 3);
        console.unmount();
    }

    #[test]
    fn test_fixed_query_id_policy() {
        let mut config = offline_config();
        config.console.query_id = QueryIdPolicy::Fixed;
        let console = QueryConsole::new(&config).unwrap();
        assert_eq!(console.next_query_id(), "47204a6b-8eb1-4d83-bcf1-2d7ba8cba740");
    }

    #[test]
    fn test_per_request_query_ids_differ() {
        let console = QueryConsole::new(&offline_config()).unwrap();
        let a = console.next_query_id();
        let b = console.next_query_id();
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }
}
