//! Canonical record types emitted by the parsers and the scanner (§3).

use crate::value::Kv;
use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A fully parsed log line: extracted timestamp/severity/message plus the
/// flat, ordered attribute list the parser produced.
///
/// Attribute order is the parser's emission order. Duplicates with the same
/// key are permitted and retained — callers that want a map build one
/// themselves.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRecord {
    pub timestamp: Option<DateTime<Utc>>,
    pub severity: String,
    pub body: String,
    pub attributes: Vec<Kv>,
}

impl StructuredRecord {
    pub fn empty() -> Self {
        Self {
            timestamp: None,
            severity: String::new(),
            body: String::new(),
            attributes: Vec::new(),
        }
    }
}

/// One line observed by the [`crate::scanner::Scanner`].
///
/// `structured` is `None` when no handler recognized the line; the event
/// still carries the raw bytes so sinks like the pretty-printer can fall
/// back to printing them verbatim.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub parsed_at: DateTime<Utc>,
    pub raw: Bytes,
    pub structured: Option<StructuredRecord>,
}

impl LogEvent {
    pub fn unstructured(parsed_at: DateTime<Utc>, raw: Bytes) -> Self {
        Self { parsed_at, raw, structured: None }
    }

    pub fn structured(parsed_at: DateTime<Utc>, raw: Bytes, record: StructuredRecord) -> Self {
        Self { parsed_at, raw, structured: Some(record) }
    }
}

/// Identifies a [`crate::sink::memstore::StoredSequence`]: the (machine,
/// session) pair a batch of events was ingested under. Ordered by
/// `machine_id` then `session_id`, which is the order the in-memory store's
/// index is kept in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SinkId {
    pub machine_id: i64,
    pub session_id: i64,
}

impl SinkId {
    pub fn new(machine_id: i64, session_id: i64) -> Self {
        Self { machine_id, session_id }
    }
}
