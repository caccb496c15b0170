//! Log Ring Buffer (§4.9, grounded in spec.md §3 `LogRecord`) — a fixed
//! capacity, `VecDeque`-backed record of completed upstream calls, read-only
//! to the admin UI and offset-paginated.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub model: String,
    pub status_code: u16,
    pub status_text: String,
}

impl LogRecord {
    /// Derived UI badge class: `"2xx"`/`"4xx"`/`"5xx"`, or `"???"` for a
    /// status code outside the normal HTTP ranges.
    pub fn status_class(&self) -> &'static str {
        match self.status_code / 100 {
            2 => "2xx",
            3 => "3xx",
            4 => "4xx",
            5 => "5xx",
            _ => "???",
        }
    }
}

pub struct LogBuffer {
    capacity: usize,
    records: Mutex<VecDeque<LogRecord>>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub fn push(&self, record: LogRecord) {
        let mut records = self.records.lock().expect("log buffer lock poisoned");
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Oldest-first page starting at `offset`, capped at `limit` entries.
    pub fn page(&self, offset: usize, limit: usize) -> Vec<LogRecord> {
        let records = self.records.lock().expect("log buffer lock poisoned");
        records.iter().skip(offset).take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("log buffer lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(session_id: &str) -> LogRecord {
        LogRecord {
            timestamp: Utc::now(),
            session_id: session_id.to_string(),
            model: "claude-sonnet".to_string(),
            status_code: 200,
            status_text: "OK".to_string(),
        }
    }

    #[test]
    fn drops_oldest_once_capacity_is_reached() {
        let buffer = LogBuffer::new(2);
        buffer.push(record("a"));
        buffer.push(record("b"));
        buffer.push(record("c"));
        let page = buffer.page(0, 10);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].session_id, "b");
        assert_eq!(page[1].session_id, "c");
    }

    #[test]
    fn status_class_buckets_by_leading_digit() {
        let mut ok = record("a");
        ok.status_code = 200;
        assert_eq!(ok.status_class(), "2xx");

        let mut rejected = record("a");
        rejected.status_code = 429;
        assert_eq!(rejected.status_class(), "4xx");

        let mut failed = record("a");
        failed.status_code = 503;
        assert_eq!(failed.status_class(), "5xx");
    }

    #[test]
    fn page_respects_offset_and_limit() {
        let buffer = LogBuffer::new(10);
        for id in ["a", "b", "c", "d"] {
            buffer.push(record(id));
        }
        let page = buffer.page(1, 2);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].session_id, "b");
        assert_eq!(page[1].session_id, "c");
    }
}
