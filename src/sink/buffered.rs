//! Fixed-capacity in-process batcher in front of a downstream [`BatchSink`]
//! (§4.7).

use crate::error::SinkError;
use crate::record::LogEvent;
use crate::sink::{BatchSink, Sink};
use async_trait::async_trait;

pub struct BufferedSink<D: BatchSink> {
    downstream: D,
    capacity: usize,
    buffer: Vec<LogEvent>,
}

impl<D: BatchSink> BufferedSink<D> {
    pub fn new(downstream: D, capacity: usize) -> Self {
        assert!(capacity > 0, "BufferedSink capacity must be nonzero");
        Self { downstream, capacity, buffer: Vec::with_capacity(capacity) }
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Sends a clone of the buffer downstream, keeping `self.buffer` intact
    /// until the call succeeds. On failure the buffer is left exactly as it
    /// was — the caller (`receive`) is the one that drops the single
    /// triggering event, not this method.
    async fn flush(&mut self) -> Result<(), SinkError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.downstream.receive_batch(self.buffer.clone()).await?;
        self.buffer.clear();
        Ok(())
    }
}

#[async_trait]
impl<D: BatchSink + Send> Sink for BufferedSink<D> {
    /// Appends `event` to the buffer; once it reaches `capacity`, flushes to
    /// the downstream batch sink. If the flush fails, only the event that
    /// triggered it is dropped from the buffer — the rest stay buffered, and
    /// the error is returned so a caller can retry the dropped event itself.
    async fn receive(&mut self, event: LogEvent) -> Result<(), SinkError> {
        self.buffer.push(event);
        if self.buffer.len() >= self.capacity {
            if let Err(err) = self.flush().await {
                self.buffer.pop();
                return Err(err);
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        self.flush().await?;
        self.downstream.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::Utc;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingBatcher {
        batches: Arc<Mutex<Vec<Vec<LogEvent>>>>,
        fail_next: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl BatchSink for RecordingBatcher {
        async fn receive_batch(&mut self, events: Vec<LogEvent>) -> Result<(), SinkError> {
            if std::mem::take(&mut *self.fail_next.lock().await) {
                return Err(SinkError::Other("downstream unavailable".into()));
            }
            self.batches.lock().await.push(events);
            Ok(())
        }
    }

    fn event() -> LogEvent {
        LogEvent::unstructured(Utc::now(), Bytes::from_static(b"x"))
    }

    #[tokio::test]
    async fn flushes_exactly_at_capacity() {
        let downstream = RecordingBatcher::default();
        let mut sink = BufferedSink::new(downstream.clone(), 3);
        sink.receive(event()).await.unwrap();
        sink.receive(event()).await.unwrap();
        assert_eq!(sink.buffered_len(), 2);
        sink.receive(event()).await.unwrap();
        assert_eq!(sink.buffered_len(), 0);
        assert_eq!(downstream.batches.lock().await.len(), 1);
        assert_eq!(downstream.batches.lock().await[0].len(), 3);
    }

    #[tokio::test]
    async fn failed_flush_drops_only_the_triggering_event() {
        let downstream = RecordingBatcher::default();
        *downstream.fail_next.lock().await = true;
        let mut sink = BufferedSink::new(downstream.clone(), 2);
        sink.receive(event()).await.unwrap();
        let err = sink.receive(event()).await.unwrap_err();
        assert!(matches!(err, SinkError::Other(_)));
        // The triggering event was dropped; the first one is still buffered.
        assert_eq!(sink.buffered_len(), 1);
    }

    #[tokio::test]
    async fn close_flushes_remainder() {
        let downstream = RecordingBatcher::default();
        let mut sink = BufferedSink::new(downstream.clone(), 10);
        sink.receive(event()).await.unwrap();
        sink.receive(event()).await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(downstream.batches.lock().await.len(), 1);
        assert_eq!(downstream.batches.lock().await[0].len(), 2);
    }
}
