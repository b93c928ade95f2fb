//! Engine-to-control-plane event bridge.
//!
//! The capture engine runs in its own execution context, potentially
//! multithreaded, and must never block on control-plane delivery. The
//! bridge translates the engine's four lifecycle hooks 1:1 into commands
//! on the control-plane's channel:
//!
//! ```text
//! ┌────────────────┐                       ┌──────────────────┐
//! │ Capture engine │                       │  Control plane   │
//! │  (own context) │                       │  (single loop)   │
//! │                │   unbounded channel   │                  │
//! │  on_flow_* ────┼──────────────────────►│ store mutation + │
//! │  on_view_reset │                       │ broadcast        │
//! └────────────────┘                       └──────────────────┘
//! ```
//!
//! Hook invocations are enqueued in call order and drained in that order
//! by the loop; the channel is the store's only write path from the
//! engine side.

use crate::flow::{Flow, FlowId};
use crate::plane::Command;
use tokio::sync::mpsc;
use tracing::warn;

/// A flow lifecycle event produced by the capture engine.
#[derive(Debug)]
pub enum EngineEvent {
    /// The engine created a flow.
    Created(Box<Flow>),
    /// The engine changed a flow it created earlier.
    Updated(Box<Flow>),
    /// The engine discarded a flow.
    Removed(FlowId),
    /// The engine asks every observer to refetch the whole view.
    ViewReset,
}

/// Inbound hook surface handed to the capture engine.
///
/// Cheap to clone; every clone feeds the same control-plane loop.
#[derive(Clone)]
pub struct EngineBridge {
    tx: mpsc::UnboundedSender<Command>,
}

impl EngineBridge {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    fn forward(&self, event: EngineEvent) {
        if self.tx.send(Command::Engine(event)).is_err() {
            warn!("control plane is gone; dropping engine event");
        }
    }

    /// The engine created `flow`.
    pub fn on_flow_created(&self, flow: Flow) {
        self.forward(EngineEvent::Created(Box::new(flow)));
    }

    /// The engine updated `flow`.
    pub fn on_flow_updated(&self, flow: Flow) {
        self.forward(EngineEvent::Updated(Box::new(flow)));
    }

    /// The engine removed the flow with `id`.
    pub fn on_flow_removed(&self, id: FlowId) {
        self.forward(EngineEvent::Removed(id));
    }

    /// The engine requests a full view refresh on every observer.
    pub fn on_view_reset(&self) {
        self.forward(EngineEvent::ViewReset);
    }
}
