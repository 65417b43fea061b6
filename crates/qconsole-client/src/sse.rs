//! Incremental `text/event-stream` decoder.
//!
//! Bytes arrive in arbitrary chunks; complete lines are interpreted with
//! EventSource rules and an event is dispatched on every blank line.

use std::time::Duration;

/// Event type used when the server sends no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    pub fn is_message(&self) -> bool {
        self.event == DEFAULT_EVENT
    }
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of the current, not yet terminated line
    line: Vec<u8>,
    /// Previous chunk ended on `\r`; a leading `\n` belongs to that line ending
    skip_lf: bool,
    /// Byte-order mark not yet checked
    started: bool,
    data: String,
    event: String,
    /// Value of the latest `id:` field, committed on dispatch
    id_buffer: Option<String>,
    last_event_id: Option<String>,
    retry: Option<Duration>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        for &byte in chunk {
            if self.skip_lf {
                self.skip_lf = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(&mut events),
                b'\r' => {
                    self.end_line(&mut events);
                    self.skip_lf = true;
                }
                _ => self.line.push(byte),
            }
        }
        events
    }

    /// Id in effect at the last dispatched event, kept across reconnects.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref().filter(|id| !id.is_empty())
    }

    /// Reconnect delay most recently requested by the server, if changed.
    pub fn take_retry(&mut self) -> Option<Duration> {
        self.retry.take()
    }

    /// Drop partial state before a reconnect.
    pub fn reset(&mut self) {
        self.line.clear();
        self.skip_lf = false;
        self.started = false;
        self.data.clear();
        self.event.clear();
        self.id_buffer = self.last_event_id.clone();
    }

    fn end_line(&mut self, events: &mut Vec<SseEvent>) {
        let bytes = std::mem::take(&mut self.line);
        let mut line = String::from_utf8_lossy(&bytes).into_owned();
        if !self.started {
            self.started = true;
            if let Some(rest) = line.strip_prefix('\u{feff}') {
                line = rest.to_string();
            }
        }

        if line.is_empty() {
            if let Some(event) = self.dispatch() {
                events.push(event);
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };
        match field {
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "event" => self.event = value.to_string(),
            "id" if !value.contains('\0') => self.id_buffer = Some(value.to_string()),
            "retry" if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        self.last_event_id = self.id_buffer.clone();
        let event = std::mem::take(&mut self.event);
        if self.data.is_empty() {
            return None;
        }
        let mut data = std::mem::take(&mut self.data);
        data.pop();
        Some(SseEvent {
            event: if event.is_empty() { DEFAULT_EVENT.to_string() } else { event },
            data,
            id: self.last_event_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn message(data: &str, id: Option<&str>) -> SseEvent {
        SseEvent { event: DEFAULT_EVENT.to_string(), data: data.to_string(), id: id.map(String::from) }
    }

    #[test]
    fn test_single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: {\"value\": 42}\n\n");
        assert_eq!(events, vec![message("{\"value\": 42}", None)]);
    }

    #[test]
    fn test_event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"da").is_empty());
        assert!(decoder.feed(b"ta: hel").is_empty());
        assert!(decoder.feed(b"lo\r").is_empty());
        let events = decoder.feed(b"\n\r\n");
        assert_eq!(events, vec![message("hello", None)]);
    }

    #[test]
    fn test_multiline_data_and_comments() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keep-alive\ndata: first\ndata:second\n\n");
        assert_eq!(events, vec![message("first\nsecond", None)]);
    }

    #[test]
    fn test_named_event_and_id() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"event: status\nid: 7\ndata: x\n\ndata: y\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, "status");
        assert!(!events[0].is_message());
        assert_eq!(events[1], message("y", Some("7")));
        assert_eq!(decoder.last_event_id(), Some("7"));
    }

    #[test]
    fn test_retry_field() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"retry: 1500\n\nretry: soon\n\n");
        assert_eq!(decoder.take_retry(), Some(Duration::from_millis(1500)));
        assert_eq!(decoder.take_retry(), None);
    }

    #[test]
    fn test_blank_line_without_data_dispatches_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"event: ping\n\n\n").is_empty());
        // event type does not leak into the next event
        assert_eq!(decoder.feed(b"data: z\n\n"), vec![message("z", None)]);
    }

    #[test]
    fn test_reset_drops_partial_event_keeps_id() {
        let mut decoder = SseDecoder::new();
        decoder.feed(b"id: 3\ndata: done\n\nid: 4\ndata: partial\n");
        assert_eq!(decoder.last_event_id(), Some("3"));
        decoder.reset();
        assert_eq!(decoder.last_event_id(), Some("3"));
        assert_eq!(decoder.feed(b"data: next\n\n"), vec![message("next", Some("3"))]);
    }

    #[test]
    fn test_byte_order_mark_is_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed("\u{feff}data: a\n\n".as_bytes());
        assert_eq!(events, vec![message("a", None)]);
    }
}
