//! In-memory, per-(machine, session) log store with range-query cursors
//! (§4.9).
//!
//! Each [`StoredSequence`] is guarded by its own read-write lock so
//! concurrent queries against disjoint sequences never contend; the store
//! keeps a single small index — `(SinkId, Arc<RwLock<Vec<LogEvent>>>)`,
//! sorted by `SinkId` — behind one mutex, mirroring the agent pool's split
//! between a cheap, short-held index lock and long-held per-connection state.

use crate::error::{SinkError, StoreError};
use crate::record::{LogEvent, SinkId};
use crate::sink::Sink;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_stream::Stream;
use tracing::debug;

/// Policy applied when an insert into a [`StoredSequence`] would violate the
/// non-decreasing `parsed_at` invariant.
///
/// Defaults to `Panic` in debug builds (open question #1): the violation is
/// a programmer error (a single producer handing the store an event older
/// than its own last one), not a data-dependent condition, so the loud
/// failure is preferable during development. Release builds that want to
/// keep running in the face of a misbehaving producer can opt into `Reject`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutOfOrderPolicy {
    Panic,
    Reject,
}

impl Default for OutOfOrderPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            OutOfOrderPolicy::Panic
        } else {
            OutOfOrderPolicy::Reject
        }
    }
}

/// A time-range filter over a [`StoredSequence`]. `from` is inclusive, `to`
/// is exclusive; if both are set, `from <= to` must hold.
#[derive(Debug, Clone, Copy, Default)]
pub struct Query {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl Query {
    pub fn new(from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        if let (Some(from), Some(to)) = (from, to) {
            assert!(from <= to, "Query.from must be <= Query.to");
        }
        Self { from, to }
    }

    fn matches(&self, ts: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| ts >= from) && self.to.map_or(true, |to| ts < to)
    }
}

struct StoredSequence {
    events: RwLock<Vec<LogEvent>>,
}

impl StoredSequence {
    fn new() -> Self {
        Self { events: RwLock::new(Vec::new()) }
    }
}

/// The in-memory store: a sorted index of [`StoredSequence`]s keyed by
/// [`SinkId`], behind one mutex for index mutation, plus per-sequence locks
/// for the append-only event lists themselves.
pub struct MemStore {
    index: Mutex<Vec<(SinkId, Arc<StoredSequence>)>>,
    heartbeat_interval: std::time::Duration,
    out_of_order_policy: OutOfOrderPolicy,
}

impl MemStore {
    pub fn new() -> Self {
        Self::with_options(std::time::Duration::from_secs(3600), OutOfOrderPolicy::default())
    }

    pub fn with_options(heartbeat_interval: std::time::Duration, policy: OutOfOrderPolicy) -> Self {
        Self {
            index: Mutex::new(Vec::new()),
            heartbeat_interval,
            out_of_order_policy: policy,
        }
    }

    async fn sequence_for(&self, id: SinkId) -> Arc<StoredSequence> {
        let mut index = self.index.lock().await;
        match index.binary_search_by_key(&id, |(k, _)| *k) {
            Ok(pos) => index[pos].1.clone(),
            Err(pos) => {
                let seq = Arc::new(StoredSequence::new());
                index.insert(pos, (id, seq.clone()));
                seq
            }
        }
    }

    /// Returns a [`Sink`] bound to `(machine_id, session_id)` and the
    /// current heartbeat interval (§4.9).
    pub async fn sink_for(&self, machine_id: i64, session_id: i64) -> (MemStoreSink, std::time::Duration) {
        let id = SinkId::new(machine_id, session_id);
        let sequence = self.sequence_for(id).await;
        (MemStoreSink { id, sequence, policy: self.out_of_order_policy }, self.heartbeat_interval)
    }

    /// Idempotent: returns the current heartbeat interval without mutating
    /// anything.
    pub fn heartbeat(&self, _machine_id: i64, _session_id: i64) -> std::time::Duration {
        self.heartbeat_interval
    }

    /// For each stored sequence, find the first event matching `query` and
    /// yield a [`Cursor`] walking forward from there; sequences with no
    /// match are skipped.
    pub async fn query(&self, query: Query) -> impl Stream<Item = Cursor> + '_ {
        let snapshot: Vec<(SinkId, Arc<StoredSequence>)> = self.index.lock().await.clone();
        async_stream::stream! {
            for (id, sequence) in snapshot {
                let events = sequence.events.read().await;
                let start = events.partition_point(|e| query.from.map_or(false, |from| e.parsed_at < from));
                let matching: Vec<LogEvent> = events[start..]
                    .iter()
                    .take_while(|e| query.to.map_or(true, |to| e.parsed_at < to))
                    .filter(|e| query.matches(e.parsed_at))
                    .cloned()
                    .collect();
                drop(events);
                if !matching.is_empty() {
                    yield Cursor::new(id, matching);
                }
            }
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`Sink`] bound to one [`SinkId`]; appends go straight into the shared
/// [`StoredSequence`] behind its write lock.
pub struct MemStoreSink {
    id: SinkId,
    sequence: Arc<StoredSequence>,
    policy: OutOfOrderPolicy,
}

impl MemStoreSink {
    async fn append(&mut self, event: LogEvent) -> Result<(), SinkError> {
        let mut events = self.sequence.events.write().await;
        if let Some(last) = events.last() {
            if event.parsed_at < last.parsed_at {
                let err = StoreError {
                    machine_id: self.id.machine_id,
                    session_id: self.id.session_id,
                    new: event.parsed_at,
                    last: last.parsed_at,
                };
                return match self.policy {
                    OutOfOrderPolicy::Panic => panic!("{err}"),
                    OutOfOrderPolicy::Reject => Err(SinkError::StoreViolation(err)),
                };
            }
        }
        events.push(event);
        Ok(())
    }
}

#[async_trait]
impl Sink for MemStoreSink {
    async fn receive(&mut self, event: LogEvent) -> Result<(), SinkError> {
        self.append(event).await
    }
}

/// Lazy forward iterator over the events a [`MemStore::query`] matched for
/// one [`SinkId`] (§4.9). The whole matching slice is materialized eagerly
/// at query time (behind a read lock held only for that copy); iteration
/// itself does not touch the store again.
pub struct Cursor {
    id: SinkId,
    events: Vec<LogEvent>,
    position: usize,
}

impl Cursor {
    fn new(id: SinkId, events: Vec<LogEvent>) -> Self {
        Self { id, events, position: 0 }
    }

    pub fn ids(&self) -> (i64, i64) {
        (self.id.machine_id, self.id.session_id)
    }

    /// Advances the cursor. Returns `true` if `event()` now has something
    /// new to return.
    pub fn next(&mut self) -> bool {
        if self.position < self.events.len() {
            self.position += 1;
            true
        } else {
            false
        }
    }

    pub fn event(&self) -> Option<&LogEvent> {
        self.events.get(self.position.saturating_sub(1))
    }

    pub fn err(&self) -> Option<&str> {
        None
    }

    pub fn close(self) {
        debug!(machine_id = self.id.machine_id, session_id = self.id.session_id, "cursor closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio_stream::StreamExt;

    fn event_at(ts: DateTime<Utc>) -> LogEvent {
        LogEvent::unstructured(ts, Bytes::from_static(b"line"))
    }

    #[tokio::test]
    async fn range_query_yields_expected_slice() {
        let store = MemStore::new();
        let (mut sink, _) = store.sink_for(1, 1).await;
        let t0 = Utc::now();
        let times: Vec<DateTime<Utc>> = (0..5).map(|i| t0 + chrono::Duration::milliseconds(i)).collect();
        for t in &times {
            sink.receive(event_at(*t)).await.unwrap();
        }

        let query = Query::new(Some(times[2]), Some(times[4]));
        let mut cursors: Vec<Cursor> = store.query(query).await.collect().await;
        assert_eq!(cursors.len(), 1);
        let cursor = &mut cursors[0];
        let mut seen = Vec::new();
        while cursor.next() {
            seen.push(cursor.event().unwrap().parsed_at);
        }
        assert_eq!(seen, vec![times[2], times[3]]);
    }

    #[tokio::test]
    async fn disjoint_sequences_do_not_interfere() {
        let store = MemStore::new();
        let (mut a, _) = store.sink_for(1, 1).await;
        let (mut b, _) = store.sink_for(2, 1).await;
        let t = Utc::now();
        a.receive(event_at(t)).await.unwrap();
        b.receive(event_at(t)).await.unwrap();

        let cursors: Vec<Cursor> = store.query(Query::default()).await.collect().await;
        assert_eq!(cursors.len(), 2);
    }

    #[tokio::test]
    async fn out_of_order_insert_is_rejected_when_policy_is_reject() {
        let store = MemStore::with_options(std::time::Duration::from_secs(1), OutOfOrderPolicy::Reject);
        let (mut sink, _) = store.sink_for(1, 1).await;
        let t0 = Utc::now();
        sink.receive(event_at(t0)).await.unwrap();
        let err = sink.receive(event_at(t0 - chrono::Duration::seconds(1))).await.unwrap_err();
        assert!(matches!(err, SinkError::StoreViolation(_)));
    }

    #[tokio::test]
    async fn heartbeat_is_idempotent() {
        let store = MemStore::new();
        let first = store.heartbeat(1, 1);
        let second = store.heartbeat(1, 1);
        assert_eq!(first, second);
    }
}
