//! Typed client handle onto the control-plane loop.
//!
//! Each method enqueues one command and awaits its oneshot reply. The
//! handle is cheap to clone; all clones feed the same loop, so operations
//! from any number of handles serialize through the one channel.

use super::command::{Command, ContentDownload};
use crate::broadcast::SubscriberId;
use crate::contentview::Rendered;
use crate::error::{ApiError, ApiResult};
use crate::events::{EventLogEntry, LogLevel};
use crate::flow::{Flow, FlowId, FlowPatch, FlowSummary, MessagePart};
use crate::settings::SettingsReport;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};

/// Cloneable handle for issuing control-surface operations.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl ControlHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    fn send(&self, command: Command) -> ApiResult<()> {
        self.tx
            .send(command)
            .map_err(|_| ApiError::Internal("control plane unavailable".to_string()))
    }

    /// The current visible sequence as summaries.
    pub async fn list_flows(&self) -> ApiResult<Vec<FlowSummary>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ListFlows { reply })?;
        Ok(rx.await?)
    }

    /// The visible flows, cloned in order, for a capture export.
    pub async fn export_flows(&self) -> ApiResult<Vec<Flow>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ExportFlows { reply })?;
        Ok(rx.await?)
    }

    /// Replace the store contents with `flows`, preserving their order.
    /// Returns the number of flows added.
    pub async fn import_flows(&self, flows: Vec<Flow>) -> ApiResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ImportFlows { flows, reply })?;
        Ok(rx.await?)
    }

    /// Empty the store.
    pub async fn clear(&self) -> ApiResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ClearFlows { reply })?;
        Ok(rx.await?)
    }

    /// Resume one intercepted flow.
    pub async fn resume(&self, id: FlowId) -> ApiResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Resume { id, reply })?;
        rx.await?
    }

    /// Resume every intercepted flow; returns how many were resumed.
    pub async fn resume_all(&self) -> ApiResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ResumeAll { reply })?;
        Ok(rx.await?)
    }

    /// Kill (when killable) and remove one flow.
    pub async fn delete(&self, id: FlowId) -> ApiResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Delete { id, reply })?;
        rx.await?
    }

    /// Apply a typed partial edit after taking an undo snapshot.
    pub async fn edit(&self, id: FlowId, patch: FlowPatch) -> ApiResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Edit { id, patch, reply })?;
        rx.await?
    }

    /// Duplicate a flow; returns the copy's id.
    pub async fn duplicate(&self, id: FlowId) -> ApiResult<FlowId> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Duplicate { id, reply })?;
        rx.await?
    }

    /// Restore a flow's undo snapshot (silent no-op without one).
    pub async fn revert(&self, id: FlowId) -> ApiResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Revert { id, reply })?;
        rx.await?
    }

    /// Snapshot, clear the response, and ask the engine to re-issue the
    /// request.
    pub async fn replay(&self, id: FlowId) -> ApiResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Replay { id, reply })?;
        rx.await?
    }

    /// Read one message's raw body with download metadata.
    pub async fn read_content(&self, id: FlowId, part: MessagePart) -> ApiResult<ContentDownload> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ReadContent { id, part, reply })?;
        rx.await?
    }

    /// Replace one message's raw body.
    pub async fn write_content(
        &self,
        id: FlowId,
        part: MessagePart,
        body: Vec<u8>,
    ) -> ApiResult<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::WriteContent { id, part, body, reply })?;
        rx.await?
    }

    /// Render one message's body with a named transform.
    pub async fn render_content(
        &self,
        id: FlowId,
        part: MessagePart,
        transform: &str,
    ) -> ApiResult<Rendered> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RenderContent {
            id,
            part,
            transform: transform.to_string(),
            reply,
        })?;
        rx.await?
    }

    /// Read the toggle set.
    pub async fn settings(&self) -> ApiResult<SettingsReport> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GetSettings { reply })?;
        Ok(rx.await?)
    }

    /// Apply recognized toggles; returns the changed subset.
    pub async fn update_settings(
        &self,
        patch: Map<String, Value>,
    ) -> ApiResult<Map<String, Value>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::UpdateSettings { patch, reply })?;
        Ok(rx.await?)
    }

    /// The retained event-log entries.
    pub async fn events(&self) -> ApiResult<Vec<EventLogEntry>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ListEvents { reply })?;
        Ok(rx.await?)
    }

    /// Append to the event log; the entry is broadcast to observers.
    pub fn log_event(&self, level: LogLevel, message: impl Into<String>) {
        let _ = self.tx.send(Command::LogEvent {
            level,
            message: message.into(),
        });
    }

    /// Register an update-channel subscriber.
    pub async fn subscribe(&self, tx: mpsc::UnboundedSender<String>) -> ApiResult<SubscriberId> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Subscribe { tx, reply })?;
        Ok(rx.await?)
    }

    /// Drop an update-channel subscriber. Fire-and-forget, idempotent.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let _ = self.tx.send(Command::Unsubscribe { id });
    }
}
