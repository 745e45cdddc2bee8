//! Fan-out sink composing a heterogeneous list of children (§4.6).
//!
//! Children are classified once, at construction, purely by whether they
//! implement [`BatchSink`]: a batcher always receives via `receive_batch`
//! (wrapping single events into one-element batches), a non-batcher always
//! receives via `receive`. There is no third "both" variant — a type that
//! implements both traits is registered under whichever wrapper the caller
//! chooses, since the routing rule only cares about capability, not identity.

use crate::error::SinkError;
use crate::record::LogEvent;
use crate::sink::{BatchSink, Sink};
use async_trait::async_trait;

/// One child of a [`Tee`], tagged by its batching capability.
pub enum TeeChild {
    Single(Box<dyn Sink>),
    Batch(Box<dyn BatchSink>),
}

/// Best-effort broadcast to every child. A child's failure is reported with
/// its index; earlier children that already succeeded are not rolled back
/// (§4.6 — no transactional semantics).
pub struct Tee {
    children: Vec<TeeChild>,
}

impl Tee {
    pub fn new(children: Vec<TeeChild>) -> Self {
        Self { children }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[async_trait]
impl Sink for Tee {
    async fn receive(&mut self, event: LogEvent) -> Result<(), SinkError> {
        for (index, child) in self.children.iter_mut().enumerate() {
            let result = match child {
                TeeChild::Single(s) => s.receive(event.clone()).await,
                TeeChild::Batch(b) => b.receive_batch(vec![event.clone()]).await,
            };
            if let Err(source) = result {
                return Err(SinkError::Child { index, source: Box::new(source) });
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        let mut errors = Vec::new();
        for (index, child) in self.children.iter_mut().enumerate() {
            let result = match child {
                TeeChild::Single(s) => s.close().await,
                TeeChild::Batch(b) => b.close().await,
            };
            if let Err(source) = result {
                errors.push((index, source));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SinkError::Aggregate(errors))
        }
    }
}

#[async_trait]
impl BatchSink for Tee {
    async fn receive_batch(&mut self, events: Vec<LogEvent>) -> Result<(), SinkError> {
        for (index, child) in self.children.iter_mut().enumerate() {
            let result = match child {
                TeeChild::Batch(b) => b.receive_batch(events.clone()).await,
                TeeChild::Single(s) => {
                    let mut out = Ok(());
                    for event in events.iter().cloned() {
                        if let Err(e) = s.receive(event).await {
                            out = Err(e);
                            break;
                        }
                    }
                    out
                }
            };
            if let Err(source) = result {
                return Err(SinkError::Child { index, source: Box::new(source) });
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        Sink::close(self).await
    }
}

/// Collects every event it receives, in order. Used by tests that need a
/// sink to observe a [`crate::scanner::Scanner`]'s output.
#[derive(Default)]
pub struct CollectSink {
    pub events: Vec<LogEvent>,
}

#[async_trait]
impl Sink for CollectSink {
    async fn receive(&mut self, event: LogEvent) -> Result<(), SinkError> {
        self.events.push(event);
        Ok(())
    }
}
