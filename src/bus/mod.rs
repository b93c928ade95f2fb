//! The mutation and signal bus.
//!
//! The bus is the only path by which a flow enters, changes, or leaves the
//! store. Every successful mutation applies the store change first and then
//! broadcasts exactly one [`Signal`]; observers never see a signal for
//! state they cannot yet query. Delivery order matches application order by
//! construction: the bus only ever runs on the control-plane loop.

use crate::broadcast::BroadcastRegistry;
use crate::events::EventLogEntry;
use crate::flow::{Flow, FlowId, FlowSummary};
use crate::view::{View, ViewEvent};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::error;

/// Resource a signal refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    /// The flow store.
    Flows,
    /// Engine-wide settings.
    Settings,
    /// The event log.
    Events,
}

/// What happened to the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cmd {
    /// An entity became visible.
    Add,
    /// A visible entity changed.
    Update,
    /// An entity left the visible set.
    Remove,
    /// The whole visible set was invalidated.
    Reset,
}

/// An immutable notification of a store mutation. Transient: forwarded to
/// subscribers, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    /// Resource the signal refers to.
    pub resource: Resource,
    /// What happened.
    pub cmd: Cmd,
    /// Serialized entity, or a minimal key reference (just the id for
    /// removes). Absent for resets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

fn json_or_null<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        error!("failed to serialize signal payload: {e}");
        Value::Null
    })
}

impl Signal {
    /// A flow became visible.
    pub fn flow_add(flow: &Flow) -> Self {
        Self {
            resource: Resource::Flows,
            cmd: Cmd::Add,
            data: Some(json_or_null(&FlowSummary::of(flow))),
        }
    }

    /// A visible flow changed.
    pub fn flow_update(flow: &Flow) -> Self {
        Self {
            resource: Resource::Flows,
            cmd: Cmd::Update,
            data: Some(json_or_null(&FlowSummary::of(flow))),
        }
    }

    /// A flow left the visible sequence.
    pub fn flow_remove(id: FlowId) -> Self {
        Self {
            resource: Resource::Flows,
            cmd: Cmd::Remove,
            data: Some(json!({ "id": id })),
        }
    }

    /// The whole visible sequence was invalidated.
    pub fn flow_reset() -> Self {
        Self {
            resource: Resource::Flows,
            cmd: Cmd::Reset,
            data: None,
        }
    }

    /// Settings changed; `changed` holds exactly the updated toggles.
    pub fn settings_update(changed: Map<String, Value>) -> Self {
        Self {
            resource: Resource::Settings,
            cmd: Cmd::Update,
            data: Some(Value::Object(changed)),
        }
    }

    /// An event-log entry was appended.
    pub fn event_add(entry: &EventLogEntry) -> Self {
        Self {
            resource: Resource::Events,
            cmd: Cmd::Add,
            data: Some(json_or_null(entry)),
        }
    }

    /// Wire encoding: one JSON object per signal.
    ///
    /// `None` on a serialization failure; the failure is logged and the
    /// signal dropped rather than raised to the broadcaster's caller.
    pub fn encode(&self) -> Option<String> {
        match serde_json::to_string(self) {
            Ok(text) => Some(text),
            Err(e) => {
                error!("failed to encode signal: {e}");
                None
            }
        }
    }
}

/// The single mutation path: owns the store and the subscriber registry,
/// applies each change and broadcasts its signal in application order.
pub struct MutationBus {
    view: View,
    registry: BroadcastRegistry,
}

impl MutationBus {
    /// Wrap a store and registry.
    pub fn new(view: View, registry: BroadcastRegistry) -> Self {
        Self { view, registry }
    }

    /// Read access to the store.
    pub fn view(&self) -> &View {
        &self.view
    }

    /// The subscriber registry, for subscribe/unsubscribe bookkeeping.
    pub fn registry_mut(&mut self) -> &mut BroadcastRegistry {
        &mut self.registry
    }

    fn emit(&mut self, event: ViewEvent) {
        let signal = match event {
            ViewEvent::Add(id) => self.view.get(&id).map(Signal::flow_add),
            ViewEvent::Update(id) => self.view.get(&id).map(Signal::flow_update),
            ViewEvent::Remove(id) => Some(Signal::flow_remove(id)),
            ViewEvent::Reset => Some(Signal::flow_reset()),
        };
        if let Some(signal) = signal {
            self.registry.broadcast(&signal);
        }
    }

    /// Insert a flow, broadcasting `add` when it becomes visible.
    pub fn add(&mut self, flow: Flow) {
        if let Some(event) = self.view.add(flow) {
            self.emit(event);
        }
    }

    /// Replace a stored flow with an engine-updated copy.
    ///
    /// Returns `false` for unknown ids (a silent no-op).
    pub fn replace(&mut self, flow: Flow) -> bool {
        let id = flow.id;
        if !self.view.contains(&id) {
            return false;
        }
        if let Some(event) = self.view.update(flow) {
            self.emit(event);
        }
        true
    }

    /// Mutate a flow in place without notifying observers.
    ///
    /// Callers must follow up with [`MutationBus::touch`] once the state
    /// is ready to be observed.
    pub fn mutate_quiet<R>(&mut self, id: &FlowId, f: impl FnOnce(&mut Flow) -> R) -> Option<R> {
        self.view.get_mut(id).map(f)
    }

    /// Mutate a flow in place, then re-evaluate and broadcast.
    pub fn mutate<R>(&mut self, id: &FlowId, f: impl FnOnce(&mut Flow) -> R) -> Option<R> {
        let result = self.view.get_mut(id).map(f)?;
        self.touch(id);
        Some(result)
    }

    /// Re-evaluate the filter for `id` and broadcast the resulting signal.
    pub fn touch(&mut self, id: &FlowId) {
        if let Some(event) = self.view.reevaluate(id) {
            self.emit(event);
        }
    }

    /// Drop a flow, broadcasting `remove` when it was visible.
    ///
    /// Returns `false` for unknown ids.
    pub fn remove(&mut self, id: &FlowId) -> bool {
        if !self.view.contains(id) {
            return false;
        }
        if let Some(event) = self.view.remove(id) {
            self.emit(event);
        }
        true
    }

    /// Empty the store, broadcasting a single `reset`.
    pub fn clear(&mut self) {
        let event = self.view.clear();
        self.emit(event);
    }

    /// Duplicate a flow, broadcasting `add` for the copy.
    pub fn duplicate(&mut self, id: &FlowId) -> Option<FlowId> {
        let (new_id, event) = self.view.duplicate(id)?;
        if let Some(event) = event {
            self.emit(event);
        }
        Some(new_id)
    }

    /// Broadcast a `reset` without touching the store: the engine asked
    /// every observer to refetch.
    pub fn refresh(&mut self) {
        self.registry.broadcast(&Signal::flow_reset());
    }

    /// Broadcast a settings change.
    pub fn settings_changed(&mut self, changed: Map<String, Value>) {
        self.registry.broadcast(&Signal::settings_update(changed));
    }

    /// Broadcast an event-log append.
    pub fn event_added(&mut self, entry: &EventLogEntry) {
        self.registry.broadcast(&Signal::event_add(entry));
    }
}
