//! Size-bounded wire rendering of a flow.
//!
//! Summaries carry headers and metadata only; bodies are represented by
//! their length and a sha256 content hash, never inlined, so payload size
//! stays independent of captured body size.

use super::{ConnectionMeta, Flow, FlowError, FlowId, FlowType, Request, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Flow as rendered on the wire: list responses and `flows` signals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowSummary {
    /// Flow identifier.
    pub id: FlowId,
    /// Kind of traffic.
    #[serde(rename = "type")]
    pub flow_type: FlowType,
    /// Paused awaiting a client decision.
    pub intercepted: bool,
    /// Client-side endpoint metadata.
    pub client_conn: ConnectionMeta,
    /// Server-side endpoint metadata.
    pub server_conn: ConnectionMeta,
    /// Terminal error, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FlowError>,
    /// Request summary, when the flow has a request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestSummary>,
    /// Response summary, when the flow has a response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseSummary>,
}

/// Request metadata without the body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSummary {
    /// HTTP method.
    pub method: String,
    /// URL scheme.
    pub scheme: String,
    /// Target host.
    pub host: String,
    /// Target port.
    pub port: u16,
    /// Request path.
    pub path: String,
    /// Protocol version.
    pub http_version: String,
    /// Ordered header pairs.
    pub headers: Vec<(String, String)>,
    /// Body length in bytes.
    #[serde(rename = "contentLength")]
    pub content_length: usize,
    /// Hex sha256 of the body.
    #[serde(rename = "contentHash")]
    pub content_hash: String,
    /// When the first byte was seen.
    pub timestamp_start: Option<DateTime<Utc>>,
    /// When the last byte was seen.
    pub timestamp_end: Option<DateTime<Utc>>,
    /// Whether this request was re-issued by the engine.
    pub is_replay: bool,
}

/// Response metadata without the body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSummary {
    /// Protocol version.
    pub http_version: String,
    /// Status code.
    pub status_code: u16,
    /// Reason phrase.
    pub reason: String,
    /// Ordered header pairs.
    pub headers: Vec<(String, String)>,
    /// Body length in bytes.
    #[serde(rename = "contentLength")]
    pub content_length: usize,
    /// Hex sha256 of the body.
    #[serde(rename = "contentHash")]
    pub content_hash: String,
    /// When the first byte was seen.
    pub timestamp_start: Option<DateTime<Utc>>,
    /// When the last byte was seen.
    pub timestamp_end: Option<DateTime<Utc>>,
    /// Whether this response came from a replayed request.
    pub is_replay: bool,
}

fn content_hash(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

impl RequestSummary {
    fn of(req: &Request) -> Self {
        Self {
            method: req.method.clone(),
            scheme: req.scheme.clone(),
            host: req.host.clone(),
            port: req.port,
            path: req.path.clone(),
            http_version: req.http_version.clone(),
            headers: req.headers.to_pairs(),
            content_length: req.body.len(),
            content_hash: content_hash(&req.body),
            timestamp_start: req.timestamp_start,
            timestamp_end: req.timestamp_end,
            is_replay: req.is_replay,
        }
    }
}

impl ResponseSummary {
    fn of(resp: &Response) -> Self {
        Self {
            http_version: resp.http_version.clone(),
            status_code: resp.status_code,
            reason: resp.reason.clone(),
            headers: resp.headers.to_pairs(),
            content_length: resp.body.len(),
            content_hash: content_hash(&resp.body),
            timestamp_start: resp.timestamp_start,
            timestamp_end: resp.timestamp_end,
            is_replay: resp.is_replay,
        }
    }
}

impl FlowSummary {
    /// Render `flow` without message bodies.
    pub fn of(flow: &Flow) -> Self {
        Self {
            id: flow.id,
            flow_type: flow.flow_type,
            intercepted: flow.intercepted,
            client_conn: flow.client_conn.clone(),
            server_conn: flow.server_conn.clone(),
            error: flow.error.clone(),
            request: flow.request.as_ref().map(RequestSummary::of),
            response: flow.response.as_ref().map(ResponseSummary::of),
        }
    }
}
