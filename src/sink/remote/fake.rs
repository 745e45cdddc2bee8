//! In-memory [`Transport`] double for testing [`super::RemoteStreamSink`]
//! without a running ingest service (§8 testable properties #10-#12).
//!
//! A mutex-protected in-memory store plus builder/inspection methods test
//! code uses to script failures and assert on what was actually
//! transmitted.

use super::transport::{Session, SessionUpdate, Transport};
use crate::error::TransportError;
use crate::record::LogEvent;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    /// Every batch successfully transmitted, grouped by session (one inner
    /// `Vec` per `connect()` call) in transmission order.
    sessions: Vec<Vec<Vec<LogEvent>>>,
    connect_attempts: u32,
    /// Remaining connect failures to return before a connect finally
    /// succeeds (or terminates permanently).
    fail_connects: u32,
    connect_resource_exhausted: bool,
    /// `send_batch` calls left to fail before transmissions start
    /// succeeding again; cleared to zero as it's consumed.
    fail_sends: u32,
    send_resource_exhausted: bool,
    heartbeat_interval: Duration,
}

/// A scriptable fake remote ingest service.
pub struct FakeTransport {
    inner: Arc<Mutex<Inner>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(Mutex::new(Inner {
                heartbeat_interval: Duration::from_secs(3600),
                ..Default::default()
            })),
        })
    }

    /// Make the next `n` `connect()` calls fail transiently before one
    /// finally succeeds.
    pub async fn fail_connects(&self, n: u32) {
        self.inner.lock().await.fail_connects = n;
    }

    /// Make every future `connect()` call return resource-exhausted.
    pub async fn refuse_connects(&self) {
        self.inner.lock().await.connect_resource_exhausted = true;
    }

    /// Make the next `n` `send_batch` calls fail transiently.
    pub async fn fail_sends(&self, n: u32) {
        self.inner.lock().await.fail_sends = n;
    }

    /// Make every future `send_batch` call return resource-exhausted.
    pub async fn refuse_sends(&self) {
        self.inner.lock().await.send_resource_exhausted = true;
    }

    pub async fn set_heartbeat_interval(&self, interval: Duration) {
        self.inner.lock().await.heartbeat_interval = interval;
    }

    pub async fn connect_attempts(&self) -> u32 {
        self.inner.lock().await.connect_attempts
    }

    /// Snapshot of every session's transmitted batches, for assertions.
    pub async fn sessions(&self) -> Vec<Vec<Vec<LogEvent>>> {
        self.inner.lock().await.sessions.clone()
    }

    /// Every event transmitted across every session and batch, in order —
    /// the flattened view most tests want.
    pub async fn all_events(&self) -> Vec<LogEvent> {
        self.inner.lock().await.sessions.iter().flatten().flatten().cloned().collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(&self, resume_session_id: i64) -> Result<(Box<dyn Session>, SessionUpdate), TransportError> {
        let mut state = self.inner.lock().await;
        state.connect_attempts += 1;
        if state.connect_resource_exhausted {
            return Err(TransportError::ResourceExhausted);
        }
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(TransportError::Transient("fake connect failure".to_string()));
        }
        state.sessions.push(Vec::new());
        let index = state.sessions.len() - 1;
        let heartbeat_interval = state.heartbeat_interval;
        Ok((
            Box::new(FakeSession { inner: self.inner.clone(), index }),
            SessionUpdate {
                session_id: Some(if resume_session_id != 0 { resume_session_id } else { index as i64 + 1 }),
                heartbeat_interval: Some(heartbeat_interval),
            },
        ))
    }
}

struct FakeSession {
    inner: Arc<Mutex<Inner>>,
    index: usize,
}

#[async_trait]
impl Session for FakeSession {
    async fn send_batch(&mut self, batch: Vec<LogEvent>) -> Result<SessionUpdate, TransportError> {
        let mut state = self.inner.lock().await;
        if state.send_resource_exhausted {
            return Err(TransportError::ResourceExhausted);
        }
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            return Err(TransportError::Transient("fake send failure".to_string()));
        }
        state.sessions[self.index].push(batch);
        Ok(SessionUpdate::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;

    fn event() -> LogEvent {
        LogEvent::unstructured(Utc::now(), Bytes::from_static(b"x"))
    }

    #[tokio::test]
    async fn records_batches_per_session() {
        let fake = FakeTransport::new();
        let (mut session, _) = fake.connect(0).await.unwrap();
        session.send_batch(vec![event()]).await.unwrap();
        let (mut session2, _) = fake.connect(0).await.unwrap();
        session2.send_batch(vec![event(), event()]).await.unwrap();

        let sessions = fake.sessions().await;
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0][0].len(), 1);
        assert_eq!(sessions[1][0].len(), 2);
    }

    #[tokio::test]
    async fn scripted_connect_failures_then_success() {
        let fake = FakeTransport::new();
        fake.fail_connects(2).await;
        assert!(fake.connect(0).await.is_err());
        assert!(fake.connect(0).await.is_err());
        assert!(fake.connect(0).await.is_ok());
        assert_eq!(fake.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn refused_connect_is_resource_exhausted() {
        let fake = FakeTransport::new();
        fake.refuse_connects().await;
        let err = fake.connect(0).await.unwrap_err();
        assert!(matches!(err, TransportError::ResourceExhausted));
    }
}
