//! Commands processed by the control-plane loop.
//!
//! Every mutation of the flow store travels as one of these, whether it
//! originated in a web handler (with a oneshot reply) or in the capture
//! engine (fire-and-forget through the bridge). The single command channel
//! is the store's serialization point.

use crate::engine::EngineEvent;
use crate::error::ApiResult;
use crate::events::{EventLogEntry, LogLevel};
use crate::flow::{Flow, FlowId, FlowPatch, FlowSummary, MessagePart};
use crate::broadcast::SubscriberId;
use crate::contentview::Rendered;
use crate::settings::SettingsReport;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};

/// Raw message body plus the download metadata derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentDownload {
    /// The raw body bytes.
    pub body: Vec<u8>,
    /// Sanitized filename for the content-disposition header.
    pub filename: String,
    /// Sanitized content-encoding passthrough, when the message had one.
    pub content_encoding: Option<String>,
}

/// One unit of work for the control-plane loop.
#[derive(Debug)]
pub enum Command {
    /// A lifecycle event from the capture engine.
    Engine(EngineEvent),

    /// List the visible flows as summaries.
    ListFlows {
        /// Reply channel.
        reply: oneshot::Sender<Vec<FlowSummary>>,
    },
    /// Clone the visible flows, in order, for a capture export.
    ExportFlows {
        /// Reply channel.
        reply: oneshot::Sender<Vec<Flow>>,
    },
    /// Clear the store, then add each flow in stream order.
    ImportFlows {
        /// Decoded flows, in stream order.
        flows: Vec<Flow>,
        /// Reply channel: number of flows added.
        reply: oneshot::Sender<usize>,
    },
    /// Clear the store.
    ClearFlows {
        /// Reply channel.
        reply: oneshot::Sender<()>,
    },
    /// Resume one intercepted flow.
    Resume {
        /// Target flow.
        id: FlowId,
        /// Reply channel.
        reply: oneshot::Sender<ApiResult<()>>,
    },
    /// Resume every intercepted flow.
    ResumeAll {
        /// Reply channel: number of flows resumed.
        reply: oneshot::Sender<usize>,
    },
    /// Kill (when killable) and remove one flow.
    Delete {
        /// Target flow.
        id: FlowId,
        /// Reply channel.
        reply: oneshot::Sender<ApiResult<()>>,
    },
    /// Apply a typed partial edit after taking an undo snapshot.
    Edit {
        /// Target flow.
        id: FlowId,
        /// Parsed edit operations.
        patch: FlowPatch,
        /// Reply channel.
        reply: oneshot::Sender<ApiResult<()>>,
    },
    /// Duplicate a flow under a fresh id.
    Duplicate {
        /// Source flow.
        id: FlowId,
        /// Reply channel: the copy's id.
        reply: oneshot::Sender<ApiResult<FlowId>>,
    },
    /// Restore a flow's undo snapshot.
    Revert {
        /// Target flow.
        id: FlowId,
        /// Reply channel.
        reply: oneshot::Sender<ApiResult<()>>,
    },
    /// Snapshot, clear the response, and ask the engine to re-issue.
    Replay {
        /// Target flow.
        id: FlowId,
        /// Reply channel.
        reply: oneshot::Sender<ApiResult<()>>,
    },
    /// Read one message's raw body.
    ReadContent {
        /// Target flow.
        id: FlowId,
        /// Which message.
        part: MessagePart,
        /// Reply channel.
        reply: oneshot::Sender<ApiResult<ContentDownload>>,
    },
    /// Replace one message's raw body.
    WriteContent {
        /// Target flow.
        id: FlowId,
        /// Which message.
        part: MessagePart,
        /// The new body.
        body: Vec<u8>,
        /// Reply channel.
        reply: oneshot::Sender<ApiResult<()>>,
    },
    /// Render one message's body with a named transform.
    RenderContent {
        /// Target flow.
        id: FlowId,
        /// Which message.
        part: MessagePart,
        /// Transform name.
        transform: String,
        /// Reply channel.
        reply: oneshot::Sender<ApiResult<Rendered>>,
    },
    /// Read the toggle set.
    GetSettings {
        /// Reply channel.
        reply: oneshot::Sender<SettingsReport>,
    },
    /// Apply recognized toggles, broadcasting the changed subset.
    UpdateSettings {
        /// Raw name → value map from the client.
        patch: Map<String, Value>,
        /// Reply channel: the changed subset.
        reply: oneshot::Sender<Map<String, Value>>,
    },
    /// List event-log entries.
    ListEvents {
        /// Reply channel.
        reply: oneshot::Sender<Vec<EventLogEntry>>,
    },
    /// Append to the event log and broadcast it.
    LogEvent {
        /// Severity.
        level: LogLevel,
        /// Message text.
        message: String,
    },
    /// Register a new update-channel subscriber.
    Subscribe {
        /// The subscriber's outbound queue.
        tx: mpsc::UnboundedSender<String>,
        /// Reply channel: the subscriber handle.
        reply: oneshot::Sender<SubscriberId>,
    },
    /// Drop an update-channel subscriber. Idempotent.
    Unsubscribe {
        /// The subscriber handle.
        id: SubscriberId,
    },
}
