//! Batches events and ships them to a remote ingest service over a
//! long-lived connection, reconnecting with backoff and heartbeating while
//! idle (§4.10).
//!
//! The sink itself is a thin handle: `receive`/`close` talk to a background
//! task (spawned in [`RemoteStreamSink::spawn`]) over an mpsc channel. All
//! the reconnect/batching/heartbeat logic lives in [`worker::run`]; the
//! transport is abstracted behind [`transport::Transport`] so tests drive
//! the whole state machine against [`fake::FakeTransport`] instead of a real
//! gRPC endpoint.

mod fake;
mod grpc;
mod transport;
mod worker;

pub use fake::FakeTransport;
pub use grpc::{GrpcShape, GrpcTransport};
pub use transport::{Identity, Session, SessionUpdate, Transport};
pub use worker::RemoteConfig;

use crate::error::SinkError;
use crate::record::LogEvent;
use crate::sink::Sink;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Fan-in endpoint for the remote worker task.
///
/// `receive` is non-blocking on the common path (`try_send`); once the
/// channel is full it either drops the event with a warning or blocks,
/// per [`RemoteConfig::drop_if_full`]. `close` is single-use — calling it
/// twice is a caller bug, not a recoverable error, so it panics.
pub struct RemoteStreamSink {
    tx: Option<mpsc::Sender<LogEvent>>,
    cancel: CancellationToken,
    drop_if_full: bool,
    worker: Option<JoinHandle<()>>,
}

impl RemoteStreamSink {
    /// Spawns the worker task against any [`Transport`] — production code
    /// passes a [`GrpcTransport`], tests pass a [`FakeTransport`].
    pub fn spawn(transport: Arc<dyn Transport>, config: RemoteConfig) -> Self {
        Self::spawn_with_callback(transport, config, Arc::new(|| {}))
    }

    /// As [`Self::spawn`], but `unable_to_ingest` is invoked from the worker
    /// task if the remote permanently refuses the sink (§4.10 Terminal
    /// Refused) — the caller's hook for surfacing that upstream, e.g. to
    /// stop the scanner.
    pub fn spawn_with_callback(
        transport: Arc<dyn Transport>,
        config: RemoteConfig,
        unable_to_ingest: Arc<dyn Fn() + Send + Sync>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
        let cancel = CancellationToken::new();
        let drop_if_full = config.drop_if_full;
        let worker_cancel = cancel.clone();
        let handle = tokio::spawn(worker::run(rx, transport, worker_cancel, config, unable_to_ingest));
        Self { tx: Some(tx), cancel, drop_if_full, worker: Some(handle) }
    }
}

#[async_trait]
impl Sink for RemoteStreamSink {
    async fn receive(&mut self, event: LogEvent) -> Result<(), SinkError> {
        let Some(sender) = self.tx.as_ref() else {
            return Err(SinkError::Closed);
        };

        match sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(SinkError::Closed),
            Err(mpsc::error::TrySendError::Full(event)) => {
                if self.drop_if_full {
                    tracing::warn!("remote sink buffer full, dropping event");
                    Ok(())
                } else {
                    let sender = sender.clone();
                    tokio::select! {
                        _ = self.cancel.cancelled() => Ok(()),
                        result = sender.send(event) => result.map_err(|_| SinkError::Closed),
                    }
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        let sender = self.tx.take();
        assert!(sender.is_some(), "RemoteStreamSink::close called twice");
        drop(sender);

        if let Some(handle) = self.worker.take() {
            let _ = handle.await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use std::time::Duration;

    fn event() -> LogEvent {
        LogEvent::unstructured(Utc::now(), Bytes::from_static(b"line"))
    }

    #[tokio::test]
    async fn events_are_batched_and_delivered() {
        let fake = FakeTransport::new();
        let config = RemoteConfig { buffer_size: 4, drain_window: Duration::from_millis(20), drop_if_full: true };
        let mut sink = RemoteStreamSink::spawn(fake.clone(), config);

        for _ in 0..4 {
            sink.receive(event()).await.unwrap();
        }
        sink.close().await.unwrap();

        let all = fake.all_events().await;
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn reconnects_and_resends_after_transient_send_failure() {
        let fake = FakeTransport::new();
        fake.fail_sends(1).await;
        let config = RemoteConfig { buffer_size: 1, drain_window: Duration::from_millis(10), drop_if_full: true };
        let mut sink = RemoteStreamSink::spawn(fake.clone(), config);

        sink.receive(event()).await.unwrap();
        // `close` awaits the worker to completion, which includes the 1s
        // reconnect cooldown (§4.10) after the scripted send failure.
        sink.close().await.unwrap();

        assert_eq!(fake.all_events().await.len(), 1);
        assert!(fake.connect_attempts().await >= 2);
    }

    #[tokio::test]
    async fn close_completes_after_pending_events_flush() {
        let fake = FakeTransport::new();
        let config = RemoteConfig { buffer_size: 8, drain_window: Duration::from_millis(500), drop_if_full: true };
        let mut sink = RemoteStreamSink::spawn(fake.clone(), config);

        for _ in 0..3 {
            sink.receive(event()).await.unwrap();
        }
        sink.close().await.unwrap();

        assert_eq!(fake.all_events().await.len(), 3);
    }

    #[tokio::test]
    #[should_panic(expected = "close called twice")]
    async fn double_close_panics() {
        let fake = FakeTransport::new();
        let mut sink = RemoteStreamSink::spawn(fake, RemoteConfig::default());
        sink.close().await.unwrap();
        let _ = sink.close().await;
    }

    #[tokio::test]
    async fn resource_exhausted_connect_invokes_callback() {
        let fake = FakeTransport::new();
        fake.refuse_connects().await;
        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let called_clone = called.clone();
        let config = RemoteConfig { buffer_size: 4, drain_window: Duration::from_millis(10), drop_if_full: true };
        let mut sink = RemoteStreamSink::spawn_with_callback(
            fake,
            config,
            Arc::new(move || called_clone.store(true, std::sync::atomic::Ordering::SeqCst)),
        );

        // The worker fails its very first connect and exits before reading
        // any events, so a `receive` here races the worker's own shutdown —
        // either outcome (delivered to a channel about to close, or
        // rejected because it already has) is acceptable; only the
        // callback matters.
        let _ = sink.receive(event()).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = sink.close().await;

        assert!(called.load(std::sync::atomic::Ordering::SeqCst));
    }
}
