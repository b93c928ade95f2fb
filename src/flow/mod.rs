//! The captured-exchange data model.
//!
//! A [`Flow`] is one captured request/response (or equivalent) exchange with
//! full metadata and bodies. Flows are produced by the capture engine and
//! handed to the control plane through the engine bridge; clients observe
//! them as size-bounded summaries and edit them through a closed set of
//! typed operations.
//!
//! A flow carries a private one-slot undo snapshot: [`Flow::backup`] saves
//! the current mutable state before an in-place edit, [`Flow::revert`]
//! restores it. Only one level of undo exists; a second backup before a
//! revert overwrites the first.

mod message;
mod patch;
mod summary;

pub use message::{Headers, MessagePart, Request, Response};
pub use patch::{EditOp, FlowPatch, PatchError, RequestField, ResponseField};
pub use summary::{FlowSummary, RequestSummary, ResponseSummary};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable, globally unique flow identifier. Never changes for the flow's
/// lifetime.
pub type FlowId = Uuid;

/// Kind of captured traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowType {
    /// An HTTP exchange, with request and (possibly) response.
    Http,
    /// A raw TCP exchange; no request/response structure.
    Tcp,
}

impl std::fmt::Display for FlowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowType::Http => write!(f, "http"),
            FlowType::Tcp => write!(f, "tcp"),
        }
    }
}

/// Endpoint metadata for one side of the exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionMeta {
    /// Peer address as `host:port`, when known.
    pub address: Option<String>,
    /// Whether TLS was established on this leg.
    pub tls_established: bool,
    /// When the connection was opened.
    pub timestamp_start: Option<DateTime<Utc>>,
    /// When the connection was closed.
    pub timestamp_end: Option<DateTime<Utc>>,
}

/// A terminal error recorded on a flow by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowError {
    /// Human-readable error message.
    pub msg: String,
    /// When the error occurred.
    pub timestamp: DateTime<Utc>,
}

/// Saved prior state of a flow, created by [`Flow::backup`] and consumed
/// by [`Flow::revert`]. Only the mutable fields are captured.
#[derive(Debug, Clone, PartialEq)]
struct FlowSnapshot {
    intercepted: bool,
    error: Option<FlowError>,
    request: Option<Request>,
    response: Option<Response>,
}

/// One captured exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    /// Stable identifier, immutable for the flow's lifetime.
    pub id: FlowId,
    /// Kind of traffic.
    #[serde(rename = "type")]
    pub flow_type: FlowType,
    /// Paused mid-processing, awaiting an explicit resume or kill decision.
    pub intercepted: bool,
    /// Whether in-flight processing can still be aborted by the engine.
    pub killable: bool,
    /// Client-side endpoint metadata.
    pub client_conn: ConnectionMeta,
    /// Server-side endpoint metadata.
    pub server_conn: ConnectionMeta,
    /// Terminal error, if the exchange failed.
    pub error: Option<FlowError>,
    /// The request, for flow types that have one.
    pub request: Option<Request>,
    /// The response, for flow types that have one.
    pub response: Option<Response>,
    /// One-slot undo snapshot. Never serialized.
    #[serde(skip)]
    backup: Option<Box<FlowSnapshot>>,
}

impl Flow {
    /// Create an empty flow of the given type with a fresh id.
    pub fn new(flow_type: FlowType) -> Self {
        Self {
            id: Uuid::new_v4(),
            flow_type,
            intercepted: false,
            killable: false,
            client_conn: ConnectionMeta::default(),
            server_conn: ConnectionMeta::default(),
            error: None,
            request: None,
            response: None,
            backup: None,
        }
    }

    /// Save the current mutable state into the undo slot.
    ///
    /// Overwrites any previous snapshot; only one level of undo exists.
    pub fn backup(&mut self) {
        self.backup = Some(Box::new(FlowSnapshot {
            intercepted: self.intercepted,
            error: self.error.clone(),
            request: self.request.clone(),
            response: self.response.clone(),
        }));
    }

    /// Whether an undo snapshot exists.
    pub fn has_backup(&self) -> bool {
        self.backup.is_some()
    }

    /// Restore the last snapshot and clear the slot.
    ///
    /// Returns `false` (and leaves the flow unchanged) when no snapshot
    /// exists.
    pub fn revert(&mut self) -> bool {
        match self.backup.take() {
            Some(snap) => {
                self.intercepted = snap.intercepted;
                self.error = snap.error;
                self.request = snap.request;
                self.response = snap.response;
                true
            }
            None => false,
        }
    }

    /// Copy this flow under a fresh id.
    ///
    /// The copy was never live in the engine: it is not intercepted, not
    /// killable, and starts with an empty undo slot.
    pub fn duplicate(&self) -> Flow {
        let mut copy = self.clone();
        copy.id = Uuid::new_v4();
        copy.intercepted = false;
        copy.killable = false;
        copy.backup = None;
        copy
    }

    /// Headers and body of one message, if that message exists.
    pub fn message(&self, part: MessagePart) -> Option<(&Headers, &[u8])> {
        match part {
            MessagePart::Request => self
                .request
                .as_ref()
                .map(|r| (&r.headers, r.body.as_slice())),
            MessagePart::Response => self
                .response
                .as_ref()
                .map(|r| (&r.headers, r.body.as_slice())),
        }
    }

    /// Replace one message's raw body. Returns `false` when the message
    /// does not exist.
    pub fn set_body(&mut self, part: MessagePart, body: Vec<u8>) -> bool {
        match part {
            MessagePart::Request => match self.request.as_mut() {
                Some(r) => {
                    r.body = body;
                    true
                }
                None => false,
            },
            MessagePart::Response => match self.response.as_mut() {
                Some(r) => {
                    r.body = body;
                    true
                }
                None => false,
            },
        }
    }

    /// Keep the previous flow's undo snapshot when this flow carries none.
    ///
    /// Used when an engine-side update replaces the stored copy: the undo
    /// slot belongs to the control plane, not the engine.
    pub(crate) fn inherit_backup(&mut self, prev: Flow) {
        if self.backup.is_none() {
            self.backup = prev.backup;
        }
    }
}
