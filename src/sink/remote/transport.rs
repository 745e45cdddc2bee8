//! The transport seam [`RemoteStreamSink`](super::RemoteStreamSink) drives
//! (§4.10, §6): an object-safe pair of traits covering both wire shapes the
//! remote ingest service exposes — unary batch calls and a bidirectional
//! stream — behind one uniform "connect, then send batches" contract.
//!
//! Grounded on the teacher's `DockerOps` trait (one interface, a live
//! tonic/bollard-backed implementation and an in-memory fake for tests):
//! the worker only ever talks to `dyn Transport`/`dyn Session`, so
//! [`super::grpc::GrpcTransport`] and [`super::fake::FakeTransport`] are
//! interchangeable.

use crate::error::TransportError;
use crate::record::LogEvent;
use async_trait::async_trait;
use std::time::Duration;

/// Caller-supplied identity for a session (§4.10 construction parameters).
///
/// `Modern` carries the resource/scope descriptors the current wire
/// identity uses; `Legacy` is the machine-id-plus-generated-session-id
/// variant kept for older deployments, mirroring the two fields the
/// protobuf `Identity` message carries side by side.
#[derive(Debug, Clone)]
pub enum Identity {
    Modern { resource: String, scope: String },
    Legacy { machine_id: i64, session_id: i64 },
}

/// What a connect or a batch send told us about the session: a rotated
/// session id and/or a new heartbeat interval. Either field may be absent —
/// "0 means keep what the caller sent" in both RPC response messages (§6).
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionUpdate {
    pub session_id: Option<i64>,
    pub heartbeat_interval: Option<Duration>,
}

/// Opens sessions against the remote ingest service.
///
/// `connect` is the retried half of the worker's state machine (§4.10
/// Disconnected state); everything after that — including the very first
/// batch, which carries the bidi shape's identity handshake — goes through
/// the returned [`Session`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, resume_session_id: i64) -> Result<(Box<dyn Session>, SessionUpdate), TransportError>;
}

/// One connected session. `send_batch` is called once per transmitted
/// batch, including empty heartbeat batches; a transient failure tears the
/// session down (the worker reconnects and resends the same batch), while
/// [`TransportError::ResourceExhausted`] is permanent.
#[async_trait]
pub trait Session: Send {
    async fn send_batch(&mut self, batch: Vec<LogEvent>) -> Result<SessionUpdate, TransportError>;
}
