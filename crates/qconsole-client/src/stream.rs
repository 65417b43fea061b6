//! Long-lived subscription to the backend's event stream.
//!
//! Connection loss, non-2xx replies and end of stream all lead to a reconnect
//! after the current retry delay. The delay starts at the configured value and
//! follows the server's `retry:` field. `Last-Event-ID` is sent on reconnect
//! once the server has assigned ids.

use std::ops::ControlFlow;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::{Client, Response};
use tracing::{debug, info, warn};

use qconsole_common::{ConsoleError, Result};

use crate::sse::{SseDecoder, SseEvent};

const LAST_EVENT_ID: &str = "Last-Event-ID";

#[derive(Debug, Clone)]
pub struct EventStream {
    client: Client,
    url: String,
    retry: Duration,
}

impl EventStream {
    pub fn new(client: Client, url: String, retry: Duration) -> Self {
        Self { client, url, retry }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Deliver every `message` event to `on_message` until it returns `Break`.
    pub async fn run<F>(self, mut on_message: F)
    where
        F: FnMut(&SseEvent) -> ControlFlow<()>,
    {
        let mut decoder = SseDecoder::new();
        let mut delay = self.retry;

        loop {
            let last_id = decoder.last_event_id().map(str::to_string);
            match self.connect(last_id.as_deref()).await {
                Ok(resp) => {
                    info!(url = %self.url, "Event stream connected");
                    let mut body = resp.bytes_stream();
                    while let Some(chunk) = body.next().await {
                        let bytes = match chunk {
                            Ok(bytes) => bytes,
                            Err(e) => {
                                warn!(url = %self.url, error = %e, "Event stream read failed");
                                break;
                            }
                        };
                        for event in decoder.feed(&bytes) {
                            if !event.is_message() {
                                debug!(event = %event.event, "Ignoring non-message event");
                                continue;
                            }
                            if on_message(&event).is_break() {
                                info!(url = %self.url, "Event stream closed by subscriber");
                                return;
                            }
                        }
                        if let Some(retry) = decoder.take_retry() {
                            delay = retry;
                        }
                    }
                    warn!(url = %self.url, "Event stream ended, reconnecting in {:?}", delay);
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "Event stream unavailable, retrying in {:?}", delay);
                }
            }

            decoder.reset();
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect(&self, last_event_id: Option<&str>) -> Result<Response> {
        let mut req = self
            .client
            .get(&self.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(id) = last_event_id {
            req = req.header(LAST_EVENT_ID, id);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ConsoleError::Upstream { status: status.as_u16(), body });
        }
        Ok(resp)
    }
}
