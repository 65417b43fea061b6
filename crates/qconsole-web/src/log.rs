//! Append-only message log.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use qconsole_common::Record;

/// One received event, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// 1-based arrival number, never reused
    pub seq: u64,
    pub received_at: DateTime<Utc>,
    /// Payload re-serialized as JSON text
    pub raw: String,
    pub record: Record,
}

#[derive(Debug)]
pub struct MessageLog {
    entries: VecDeque<LogEntry>,
    next_seq: u64,
    max_entries: Option<usize>,
}

impl MessageLog {
    pub fn new(max_entries: Option<usize>) -> Self {
        Self { entries: VecDeque::new(), next_seq: 1, max_entries }
    }

    pub fn push(&mut self, raw: String, record: Record) -> LogEntry {
        let entry = LogEntry { seq: self.next_seq, received_at: Utc::now(), raw, record };
        self.next_seq += 1;
        self.entries.push_back(entry.clone());

        if let Some(max) = self.max_entries {
            while self.entries.len() > max {
                self.entries.pop_front();
            }
        }
        entry
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Entries with `seq` strictly greater than `seq`.
    pub fn after(&self, seq: u64) -> Vec<LogEntry> {
        self.entries.iter().filter(|e| e.seq > seq).cloned().collect()
    }

    /// Sequence number of the newest entry ever appended, 0 if none.
    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(log: &mut MessageLog, data: &str) -> LogEntry {
        let (raw, record) = Record::decode(data).unwrap();
        log.push(raw, record)
    }

    #[test]
    fn test_sequence_numbers_follow_arrival() {
        let mut log = MessageLog::new(None);
        assert_eq!(log.last_seq(), 0);
        assert_eq!(push(&mut log, r#"{"a":1}"#).seq, 1);
        assert_eq!(push(&mut log, r#"{"a":2}"#).seq, 2);
        assert_eq!(log.len(), 2);
        assert_eq!(log.last_seq(), 2);
        let after: Vec<u64> = log.after(1).iter().map(|e| e.seq).collect();
        assert_eq!(after, vec![2]);
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let mut log = MessageLog::new(Some(2));
        for i in 0..5 {
            push(&mut log, &format!(r#"{{"i":{i}}}"#));
        }
        let raws: Vec<String> = log.entries().into_iter().map(|e| e.raw).collect();
        assert_eq!(raws, vec![r#"{"i":3}"#, r#"{"i":4}"#]);
        assert_eq!(log.last_seq(), 5);
    }

    #[test]
    fn test_unbounded_by_default() {
        let mut log = MessageLog::new(None);
        for i in 0..1000 {
            push(&mut log, &format!(r#"{{"i":{i}}}"#));
        }
        assert_eq!(log.len(), 1000);
    }
}
