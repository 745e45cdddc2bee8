//! Sink contracts and the fan-out/storage/remote implementations that
//! consume canonical [`crate::record::LogEvent`]s (§4.6–§4.10).
//!
//! `Sink` and `BatchSink` are async traits rather than plain `async fn`
//! traits so that [`Tee`](tee::Tee) can hold a heterogeneous
//! `Vec<Box<dyn Sink>>` — native async-fn-in-trait isn't dyn-compatible,
//! so every object-safe boundary here goes through `async-trait`.

pub mod buffered;
pub mod memstore;
pub mod pretty;
pub mod remote;
pub mod tee;

pub use buffered::BufferedSink;
pub use memstore::MemStore;
pub use pretty::PrettyPrinter;
pub use remote::RemoteStreamSink;
pub use tee::Tee;

use crate::error::SinkError;
use crate::record::LogEvent;
use async_trait::async_trait;

/// A sink that accepts one event at a time.
#[async_trait]
pub trait Sink: Send {
    async fn receive(&mut self, event: LogEvent) -> Result<(), SinkError>;

    /// Release any resources and flush pending state. The default no-op is
    /// correct for sinks with nothing to drain.
    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// A sink that prefers to receive events in batches (§4.6, §4.7).
///
/// A type may implement both `Sink` and `BatchSink`; [`Tee`](tee::Tee)
/// classifies children purely by whether `BatchSink` is implemented and
/// always prefers it when present.
#[async_trait]
pub trait BatchSink: Send {
    async fn receive_batch(&mut self, events: Vec<LogEvent>) -> Result<(), SinkError>;

    async fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
