//! tonic-backed [`Transport`] implementation for both wire shapes the
//! ingest service exposes (§4.10, §6): a unary batch call and a
//! bidirectional stream, selected at construction via [`GrpcShape`].
//!
//! Grounded on the teacher's `AgentGrpcClient` (`crates/cluster/src/agent/client.rs`):
//! a thin wrapper owning one generated client, cloned per call since tonic
//! clients are `Arc`-cheap to clone.

use super::transport::{Identity, Session, SessionUpdate, Transport};
use crate::error::TransportError;
use crate::record::{LogEvent, StructuredRecord};
use crate::value::{Kv, Value};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::transport::Channel;
use tonic::{Request, Status};

mod proto {
    #![allow(clippy::all)]
    tonic::include_proto!("humanlog.ingest");
}

use proto::ingest_service_client::IngestServiceClient;
pub use proto::{IngestBatchRequest, StreamIngestRequest};

/// Which RPC shape a [`GrpcTransport`] drives. Both are defined on the same
/// `IngestService`; the worker's view of "connect, then send batches" is
/// identical either way (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrpcShape {
    /// Each batch is one `IngestBatch` unary call; identity travels on
    /// every request.
    Unary,
    /// One long-lived `StreamIngest` call; identity travels only on the
    /// first request, batches on every request after that.
    Bidi,
}

#[derive(Clone)]
pub struct GrpcTransport {
    client: IngestServiceClient<Channel>,
    identity: Identity,
    shape: GrpcShape,
}

impl GrpcTransport {
    pub fn new(channel: Channel, identity: Identity, shape: GrpcShape) -> Self {
        Self { client: IngestServiceClient::new(channel), identity, shape }
    }

    fn proto_identity(&self, resume_session_id: i64) -> proto::Identity {
        match &self.identity {
            Identity::Modern { resource, scope } => proto::Identity {
                resource: resource.clone(),
                scope: scope.clone(),
                machine_id: 0,
                legacy_session_id: resume_session_id,
            },
            Identity::Legacy { machine_id, session_id } => proto::Identity {
                resource: String::new(),
                scope: String::new(),
                machine_id: *machine_id,
                legacy_session_id: if resume_session_id != 0 { resume_session_id } else { *session_id },
            },
        }
    }
}

#[async_trait]
impl Transport for GrpcTransport {
    async fn connect(&self, resume_session_id: i64) -> Result<(Box<dyn Session>, SessionUpdate), TransportError> {
        match self.shape {
            GrpcShape::Unary => {
                let session = UnarySession {
                    client: self.client.clone(),
                    identity: self.proto_identity(resume_session_id),
                    session_id: resume_session_id,
                };
                Ok((Box::new(session), SessionUpdate { session_id: Some(resume_session_id), heartbeat_interval: None }))
            }
            GrpcShape::Bidi => {
                let (tx, rx) = mpsc::channel::<StreamIngestRequest>(1);
                let mut client = self.client.clone();
                let response = client
                    .stream_ingest(Request::new(ReceiverStream::new(rx)))
                    .await
                    .map_err(map_status)?;
                let session = BidiSession {
                    tx,
                    inbound: response.into_inner(),
                    identity: Some(self.proto_identity(resume_session_id)),
                    resume_session_id,
                };
                // Nothing has actually been sent on the stream yet — the
                // first `send_batch` call carries identity and resume id
                // alongside its batch — so there's no session update until
                // then.
                Ok((Box::new(session), SessionUpdate::default()))
            }
        }
    }
}

struct UnarySession {
    client: IngestServiceClient<Channel>,
    identity: proto::Identity,
    session_id: i64,
}

#[async_trait]
impl Session for UnarySession {
    async fn send_batch(&mut self, batch: Vec<LogEvent>) -> Result<SessionUpdate, TransportError> {
        let request = IngestBatchRequest {
            identity: Some(self.identity.clone()),
            session_id: self.session_id,
            events: batch.iter().map(to_proto_event).collect(),
        };
        let response = self.client.ingest_batch(Request::new(request)).await.map_err(map_status)?;
        let body = response.into_inner();
        if body.session_id != 0 {
            self.session_id = body.session_id;
        }
        Ok(SessionUpdate {
            session_id: (body.session_id != 0).then_some(body.session_id),
            heartbeat_interval: (body.heartbeat_interval_ms > 0)
                .then(|| std::time::Duration::from_millis(body.heartbeat_interval_ms as u64)),
        })
    }
}

struct BidiSession {
    tx: mpsc::Sender<StreamIngestRequest>,
    inbound: tonic::Streaming<proto::StreamIngestResponse>,
    /// Taken on the first `send_batch`, which is the only request that
    /// carries identity/resume info (§4.4 — mirrors the zap/docker prefix
    /// "envelope travels once" shape, just over the wire instead of a line
    /// prefix).
    identity: Option<proto::Identity>,
    resume_session_id: i64,
}

#[async_trait]
impl Session for BidiSession {
    async fn send_batch(&mut self, batch: Vec<LogEvent>) -> Result<SessionUpdate, TransportError> {
        let request = StreamIngestRequest {
            identity: self.identity.take(),
            resume_session_id: self.resume_session_id,
            events: batch.iter().map(to_proto_event).collect(),
        };
        self.tx
            .send(request)
            .await
            .map_err(|_| TransportError::Transient("bidi stream closed".to_string()))?;
        let response = self
            .inbound
            .message()
            .await
            .map_err(map_status)?
            .ok_or_else(|| TransportError::Transient("bidi stream ended early".to_string()))?;
        Ok(SessionUpdate {
            session_id: (response.session_id != 0).then_some(response.session_id),
            heartbeat_interval: (response.heartbeat_interval_ms > 0)
                .then(|| std::time::Duration::from_millis(response.heartbeat_interval_ms as u64)),
        })
    }
}

fn map_status(status: Status) -> TransportError {
    if status.code() == tonic::Code::ResourceExhausted {
        TransportError::ResourceExhausted
    } else {
        TransportError::Transient(status.message().to_string())
    }
}

fn to_proto_event(event: &LogEvent) -> proto::LogEventProto {
    proto::LogEventProto {
        parsed_at: Some(to_proto_timestamp(event.parsed_at)),
        raw: event.raw.to_vec(),
        structured: event.structured.as_ref().map(to_proto_record),
    }
}

fn to_proto_record(record: &StructuredRecord) -> proto::StructuredRecordProto {
    proto::StructuredRecordProto {
        has_timestamp: record.timestamp.is_some(),
        timestamp: record.timestamp.map(to_proto_timestamp),
        severity: record.severity.clone(),
        body: record.body.clone(),
        attributes: record.attributes.iter().map(to_proto_kv).collect(),
    }
}

fn to_proto_kv(kv: &Kv) -> proto::KvProto {
    proto::KvProto { key: kv.key.clone(), value: Some(to_proto_value(&kv.value)) }
}

fn to_proto_value(value: &Value) -> proto::ValueProto {
    use proto::value_proto::Kind;
    let kind = match value {
        Value::String(s) => Kind::StringValue(s.clone()),
        Value::Int(i) => Kind::IntValue(*i),
        Value::Float(f) => Kind::FloatValue(*f),
        Value::Bool(b) => Kind::BoolValue(*b),
        Value::Timestamp(t) => Kind::TimestampValue(to_proto_timestamp(*t)),
        Value::Duration(d) => Kind::DurationNanos(d.as_nanos() as u64),
        Value::Null => Kind::NullValue(true),
        Value::Array(items) => Kind::ArrayValue(proto::ValueArray { items: items.iter().map(to_proto_value).collect() }),
        Value::Object(pairs) => Kind::ObjectValue(proto::ValueObject {
            fields: pairs.iter().map(|(k, v)| proto::KvProto { key: k.clone(), value: Some(to_proto_value(v)) }).collect(),
        }),
    };
    proto::ValueProto { kind: Some(kind) }
}

fn to_proto_timestamp(t: chrono::DateTime<chrono::Utc>) -> prost_types::Timestamp {
    prost_types::Timestamp { seconds: t.timestamp(), nanos: t.timestamp_subsec_nanos() as i32 }
}
