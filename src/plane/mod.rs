//! The control-plane loop: single writer over the flow store.
//!
//! Two kinds of traffic feed one unbounded command channel: operations
//! issued by web handlers through [`ControlHandle`] (each carrying a
//! oneshot reply), and lifecycle events from the capture engine through
//! [`crate::engine::EngineBridge`]. The loop drains the channel in order,
//! so every store mutation and its broadcast happen on this task — the
//! store needs no locking, and signal order always matches mutation
//! order.
//!
//! Engine-facing instructions (resume, kill, replay) are fire-and-request:
//! the loop calls the [`CaptureEngine`] trait, which either accepts or
//! synchronously rejects, and never waits for the engine to finish.

mod command;
mod handle;

pub use command::{Command, ContentDownload};
pub use handle::ControlHandle;

use crate::broadcast::BroadcastRegistry;
use crate::bus::MutationBus;
use crate::contentview::{ContentViewRegistry, Rendered};
use crate::engine::{CaptureEngine, EngineEvent};
use crate::error::{ApiError, ApiResult};
use crate::events::{EventLog, LogLevel};
use crate::flow::{Flow, FlowId, FlowPatch, MessagePart};
use crate::settings::{Settings, SettingsReport};
use crate::view::View;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// The control-plane event loop.
pub struct ControlPlane {
    bus: MutationBus,
    engine: Arc<dyn CaptureEngine>,
    settings: Settings,
    views: ContentViewRegistry,
    events: EventLog,
    mode: String,
    rx: mpsc::UnboundedReceiver<Command>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ControlPlane {
    /// Create a plane over an unfiltered view.
    ///
    /// Returns the plane itself plus the two ways in: the typed client
    /// handle and the engine bridge.
    pub fn new(
        engine: Arc<dyn CaptureEngine>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Self, ControlHandle, crate::engine::EngineBridge) {
        Self::with_view(View::new(), engine, shutdown_rx)
    }

    /// Create a plane over a pre-configured view (e.g. one carrying a
    /// filter predicate).
    pub fn with_view(
        view: View,
        engine: Arc<dyn CaptureEngine>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Self, ControlHandle, crate::engine::EngineBridge) {
        let (tx, rx) = mpsc::unbounded_channel();
        let plane = Self {
            bus: MutationBus::new(view, BroadcastRegistry::new()),
            engine,
            settings: Settings::default(),
            views: ContentViewRegistry::with_defaults(),
            events: EventLog::new(),
            mode: "regular".to_string(),
            rx,
            shutdown_rx,
        };
        let handle = ControlHandle::new(tx.clone());
        let bridge = crate::engine::EngineBridge::new(tx);
        (plane, handle, bridge)
    }

    /// Override the initial toggle set.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Override the content-transform registry.
    pub fn with_content_views(mut self, views: ContentViewRegistry) -> Self {
        self.views = views;
        self
    }

    /// Set the engine operating mode reported by settings reads.
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    /// Run the loop until shutdown is signaled or every sender is gone.
    pub async fn run(mut self) {
        info!("control plane started");
        loop {
            tokio::select! {
                command = self.rx.recv() => {
                    match command {
                        Some(command) => self.handle(command),
                        None => {
                            info!("command channel closed, control plane stopping");
                            break;
                        }
                    }
                }
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!("control plane received shutdown signal");
                        break;
                    }
                }
            }
        }
        info!("control plane stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Engine(event) => self.handle_engine_event(event),
            Command::ListFlows { reply } => {
                let _ = reply.send(self.bus.view().summaries());
            }
            Command::ExportFlows { reply } => {
                let _ = reply.send(self.bus.view().iter().cloned().collect());
            }
            Command::ImportFlows { flows, reply } => {
                let _ = reply.send(self.import_flows(flows));
            }
            Command::ClearFlows { reply } => {
                self.bus.clear();
                let _ = reply.send(());
            }
            Command::Resume { id, reply } => {
                let _ = reply.send(self.resume(id));
            }
            Command::ResumeAll { reply } => {
                let _ = reply.send(self.resume_all());
            }
            Command::Delete { id, reply } => {
                let _ = reply.send(self.delete(id));
            }
            Command::Edit { id, patch, reply } => {
                let _ = reply.send(self.edit(id, patch));
            }
            Command::Duplicate { id, reply } => {
                let _ = reply.send(self.bus.duplicate(&id).ok_or(ApiError::NotFound));
            }
            Command::Revert { id, reply } => {
                let _ = reply.send(self.revert(id));
            }
            Command::Replay { id, reply } => {
                let _ = reply.send(self.replay(id));
            }
            Command::ReadContent { id, part, reply } => {
                let _ = reply.send(self.read_content(id, part));
            }
            Command::WriteContent { id, part, body, reply } => {
                let _ = reply.send(self.write_content(id, part, body));
            }
            Command::RenderContent { id, part, transform, reply } => {
                let _ = reply.send(self.render_content(id, part, &transform));
            }
            Command::GetSettings { reply } => {
                let _ = reply.send(SettingsReport {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    mode: self.mode.clone(),
                    settings: self.settings.clone(),
                    content_views: self.views.names(),
                });
            }
            Command::UpdateSettings { patch, reply } => {
                let changed = self.settings.apply(&patch);
                if !changed.is_empty() {
                    self.bus.settings_changed(changed.clone());
                }
                let _ = reply.send(changed);
            }
            Command::ListEvents { reply } => {
                let _ = reply.send(self.events.entries().cloned().collect());
            }
            Command::LogEvent { level, message } => {
                self.push_event(level, message);
            }
            Command::Subscribe { tx, reply } => {
                let _ = reply.send(self.bus.registry_mut().subscribe(tx));
            }
            Command::Unsubscribe { id } => {
                self.bus.registry_mut().unsubscribe(&id);
            }
        }
    }

    fn handle_engine_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Created(flow) => self.bus.add(*flow),
            EngineEvent::Updated(flow) => {
                if !self.bus.replace(*flow) {
                    debug!("engine update for unknown flow ignored");
                }
            }
            EngineEvent::Removed(id) => {
                self.bus.remove(&id);
            }
            EngineEvent::ViewReset => self.bus.refresh(),
        }
    }

    fn push_event(&mut self, level: LogLevel, message: impl Into<String>) {
        let entry = self.events.push(level, message);
        self.bus.event_added(&entry);
    }

    fn import_flows(&mut self, flows: Vec<Flow>) -> usize {
        self.bus.clear();
        let count = flows.len();
        for flow in flows {
            self.bus.add(flow);
        }
        count
    }

    fn resume(&mut self, id: FlowId) -> ApiResult<()> {
        let intercepted = self.bus.view().get(&id).ok_or(ApiError::NotFound)?.intercepted;
        if !intercepted {
            return Ok(());
        }
        self.engine.resume(id)?;
        self.bus.mutate(&id, |f| f.intercepted = false);
        Ok(())
    }

    fn resume_all(&mut self) -> usize {
        let intercepted: Vec<FlowId> = self
            .bus
            .view()
            .universe_ids()
            .into_iter()
            .filter(|id| {
                self.bus
                    .view()
                    .get(id)
                    .map(|f| f.intercepted)
                    .unwrap_or(false)
            })
            .collect();
        if intercepted.is_empty() {
            return 0;
        }
        if let Err(e) = self.engine.resume_all() {
            self.push_event(LogLevel::Warn, format!("resume all rejected: {e}"));
            return 0;
        }
        for id in &intercepted {
            self.bus.mutate(id, |f| f.intercepted = false);
        }
        intercepted.len()
    }

    fn delete(&mut self, id: FlowId) -> ApiResult<()> {
        let killable = self.bus.view().get(&id).ok_or(ApiError::NotFound)?.killable;
        if killable {
            // best-effort: the removal proceeds either way
            if let Err(e) = self.engine.kill(id) {
                warn!(flow = %id, "kill rejected by engine: {e}");
            }
        }
        self.bus.remove(&id);
        Ok(())
    }

    fn edit(&mut self, id: FlowId, patch: FlowPatch) -> ApiResult<()> {
        if !self.bus.view().contains(&id) {
            return Err(ApiError::NotFound);
        }
        for key in &patch.ignored {
            warn!(flow = %id, %key, "ignoring unrecognized edit key");
        }
        self.bus.mutate(&id, |flow| {
            flow.backup();
            patch.apply(flow);
        });
        Ok(())
    }

    fn revert(&mut self, id: FlowId) -> ApiResult<()> {
        let reverted = self
            .bus
            .mutate_quiet(&id, |flow| flow.revert())
            .ok_or(ApiError::NotFound)?;
        if reverted {
            self.bus.touch(&id);
        }
        Ok(())
    }

    fn replay(&mut self, id: FlowId) -> ApiResult<()> {
        let has_request = self
            .bus
            .view()
            .get(&id)
            .ok_or(ApiError::NotFound)?
            .request
            .is_some();
        if !has_request {
            return Err(ApiError::BadRequest(
                "flow has no request to replay".to_string(),
            ));
        }

        // the pending state (snapshot taken, response gone) is observable
        // before the engine is asked, and survives a rejection
        self.bus.mutate(&id, |flow| {
            flow.backup();
            flow.response = None;
        });

        let flow = self.bus.view().get(&id).cloned().ok_or(ApiError::NotFound)?;
        match self.engine.replay(&flow) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.push_event(LogLevel::Warn, format!("replay rejected for {id}: {e}"));
                Err(e.into())
            }
        }
    }

    fn read_content(&self, id: FlowId, part: MessagePart) -> ApiResult<ContentDownload> {
        let flow = self.bus.view().get(&id).ok_or(ApiError::NotFound)?;
        let (headers, body) = flow
            .message(part)
            .ok_or_else(|| ApiError::BadRequest("no content".to_string()))?;
        if body.is_empty() {
            return Err(ApiError::BadRequest("no content".to_string()));
        }

        let content_encoding = headers
            .get("content-encoding")
            .map(sanitize_token)
            .filter(|s| !s.is_empty());

        let filename = headers
            .get("content-disposition")
            .and_then(filename_from_disposition)
            .or_else(|| {
                flow.request
                    .as_ref()
                    .map(|r| last_path_segment(&r.path).to_string())
            })
            .map(|name| sanitize_filename(&name))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "content".to_string());

        Ok(ContentDownload {
            body: body.to_vec(),
            filename,
            content_encoding,
        })
    }

    fn write_content(&mut self, id: FlowId, part: MessagePart, body: Vec<u8>) -> ApiResult<()> {
        let has_message = self
            .bus
            .view()
            .get(&id)
            .ok_or(ApiError::NotFound)?
            .message(part)
            .is_some();
        if !has_message {
            return Err(ApiError::BadRequest(format!("flow has no {part}")));
        }
        self.bus.mutate(&id, |flow| {
            flow.backup();
            flow.set_body(part, body);
        });
        Ok(())
    }

    fn render_content(&self, id: FlowId, part: MessagePart, transform: &str) -> ApiResult<Rendered> {
        let flow = self.bus.view().get(&id).ok_or(ApiError::NotFound)?;
        let (headers, body) = flow
            .message(part)
            .ok_or_else(|| ApiError::BadRequest("no content".to_string()))?;
        self.views
            .render(transform, headers, body)
            .ok_or_else(|| ApiError::BadRequest(format!("unknown content view: {transform}")))
    }
}

/// Characters permitted in a download filename.
fn is_filename_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '"' | ' ' | '.' | '(' | ')')
}

fn sanitize_filename(name: &str) -> String {
    name.chars().filter(|c| is_filename_char(*c)).collect()
}

fn sanitize_token(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

/// Pull a filename out of a content-disposition header value.
fn filename_from_disposition(value: &str) -> Option<String> {
    let rest = &value[value.find("filename=")? + "filename=".len()..];
    let name: String = rest.chars().take_while(|c| is_filename_char(*c)).collect();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Last path segment, query string stripped.
fn last_path_segment(path: &str) -> &str {
    let without_query = path.split('?').next().unwrap_or("");
    without_query.rsplit('/').next().unwrap_or("")
}
