//! Server-Sent Events (SSE) feed of rendered log entries for the page.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_core::Stream;
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_stream::StreamExt;
use tracing::warn;

use crate::console::QueryConsole;
use crate::log::LogEntry;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Replay entries after this sequence number
    pub after: Option<u64>,
}

/// Log entries after a sequence number, in order, without gaps.
///
/// A subscriber that falls behind the broadcast channel refills from the log.
struct Feed {
    console: QueryConsole,
    rx: broadcast::Receiver<LogEntry>,
    backlog: VecDeque<LogEntry>,
    /// Highest sequence number handed out
    last: u64,
}

impl Feed {
    fn new(console: QueryConsole, after: u64) -> Self {
        let (backlog, rx) = console.subscribe_after(after);
        Self { console, rx, backlog: backlog.into(), last: after }
    }

    async fn next_entry(&mut self) -> Option<LogEntry> {
        loop {
            let entry = match self.backlog.pop_front() {
                Some(entry) => entry,
                None => match self.rx.recv().await {
                    Ok(entry) => entry,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, after = self.last, "Event feed lagged, replaying from the log");
                        self.backlog = self.console.entries_after(self.last).into();
                        continue;
                    }
                    Err(RecvError::Closed) => return None,
                },
            };
            if entry.seq > self.last {
                self.last = entry.seq;
                return Some(entry);
            }
        }
    }

    fn into_stream(self) -> impl Stream<Item = LogEntry> + Send + 'static {
        futures_util::stream::unfold(self, |mut feed| async move {
            feed.next_entry().await.map(|entry| (entry, feed))
        })
    }
}

/// SSE endpoint — one event per log entry, data is the entry's HTML.
///
/// A reconnecting browser resumes from its `Last-Event-ID`. The feed ends
/// when the server shuts down.
pub async fn sse_handler(
    State(state): State<SharedState>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let resume = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let after = resume.or(query.after).unwrap_or(0);

    let console = state.console.clone();
    let entries = Feed::new(state.console.clone(), after).into_stream();
    let events = entries.filter_map(move |entry| match console.render_entry(&entry) {
        // SSE data may not carry carriage returns
        Ok(html) => Some(Ok(Event::default().id(entry.seq.to_string()).data(html.replace('\r', "")))),
        Err(e) => {
            warn!(seq = entry.seq, error = %e, "Failed to render entry");
            None
        }
    });
    let stream = futures_util::StreamExt::take_until(events, state.shutdown_requested());

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;

    use qconsole_common::ConsoleConfig;

    fn offline_config() -> ConsoleConfig {
        let mut config = ConsoleConfig::default();
        config.upstream.base_url = "http://127.0.0.1:9".to_string();
        config.http.retry_ms = 50;
        config
    }

    #[tokio::test]
    async fn test_feed_resumes_after_sequence() {
        let console = QueryConsole::new(&offline_config()).unwrap();
        console.mount();
        console.ingest(r#"{"n": 1}"#).unwrap();
        console.ingest(r#"{"n": 2}"#).unwrap();

        let feed = Feed::new(console.clone(), 1).into_stream();
        console.ingest(r#"{"n": 3}"#).unwrap();
        let seqs: Vec<u64> = tokio::time::timeout(Duration::from_secs(5), feed.take(2).map(|e| e.seq).collect())
            .await
            .unwrap();
        assert_eq!(seqs, vec![2, 3]);
        console.unmount();
    }

    #[tokio::test]
    async fn test_slow_subscriber_loses_no_entries() {
        let console = QueryConsole::new(&offline_config()).unwrap();
        console.mount();
        let feed = Feed::new(console.clone(), 0).into_stream();

        // more than the broadcast channel holds before the feed is polled
        for n in 1..=300 {
            console.ingest(&format!(r#"{{"n": {n}}}"#)).unwrap();
        }

        let seqs: Vec<u64> = tokio::time::timeout(Duration::from_secs(5), feed.take(300).map(|e| e.seq).collect())
            .await
            .unwrap();
        assert_eq!(seqs, (1..=300).collect::<Vec<u64>>());
        console.unmount();
    }
}
