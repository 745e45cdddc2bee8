//! Crate-wide error types.

use thiserror::Error;

/// Errors surfaced by the [`crate::scanner::Scanner`] while reading a source.
///
/// Malformed and oversized lines are not represented here — they are not
/// errors, they show up as unstructured [`crate::record::LogEvent`]s or are
/// silently skipped (see §7 of the design notes).
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("reading source: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink failed while processing line {line}: {source}")]
    Sink {
        line: u64,
        #[source]
        source: SinkError,
    },
}

/// Error returned by a [`crate::sink::Sink`] child. The [`crate::sink::Tee`]
/// wraps this with the index of the failing child.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("child sink {index}: {source}")]
    Child {
        index: usize,
        #[source]
        source: Box<SinkError>,
    },
    #[error("{} child sink(s) failed to close: {}", .0.len(), .0.iter().map(|(i, e)| format!("[{i}] {e}")).collect::<Vec<_>>().join(", "))]
    Aggregate(Vec<(usize, SinkError)>),
    #[error("store protocol violation: {0}")]
    StoreViolation(#[from] StoreError),
    #[error("remote ingest sink is closed")]
    Closed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

/// Out-of-order insert into a [`crate::sink::memstore::StoredSequence`].
///
/// This is a programmer error, not a data-dependent one: a single producer
/// handed the store an event older than the last one it appended. The
/// default policy panics in debug builds (open question #1); release
/// builds can configure [`crate::sink::memstore::OutOfOrderPolicy::Reject`]
/// instead of aborting the process.
#[derive(Debug, Error)]
#[error("out-of-order insert for machine={machine_id} session={session_id}: new parsed_at {new:?} < last {last:?}")]
pub struct StoreError {
    pub machine_id: i64,
    pub session_id: i64,
    pub new: chrono::DateTime<chrono::Utc>,
    pub last: chrono::DateTime<chrono::Utc>,
}

/// Errors from the remote ingest transport (§4.10, §6).
#[derive(Debug, Error, Clone)]
pub enum TransportError {
    #[error("transient transport failure: {0}")]
    Transient(String),
    #[error("resource exhausted: remote refuses further ingestion")]
    ResourceExhausted,
}
