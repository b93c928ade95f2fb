//! End-to-end control-plane scenarios: a running plane driven through its
//! handle and bridge, with recording subscribers on the update channel and
//! a scripted engine standing in for the capture side.

use flowdeck::codec::{BinaryCodec, CaptureCodec};
use flowdeck::engine::{CaptureEngine, DetachedEngine, EngineBridge, EngineError};
use flowdeck::error::ApiError;
use flowdeck::flow::{Flow, FlowId, FlowPatch, FlowType, Headers, MessagePart, Request, Response};
use flowdeck::plane::{ControlHandle, ControlPlane};
use flowdeck::view::View;
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

/// Engine double that records instructions and optionally rejects replay.
#[derive(Default)]
struct ScriptedEngine {
    reject_replay: Option<String>,
    resumed: Mutex<Vec<FlowId>>,
    killed: Mutex<Vec<FlowId>>,
    replayed: Mutex<Vec<FlowId>>,
}

impl ScriptedEngine {
    fn rejecting_replay(reason: &str) -> Self {
        Self {
            reject_replay: Some(reason.to_string()),
            ..Default::default()
        }
    }
}

impl CaptureEngine for ScriptedEngine {
    fn resume(&self, id: FlowId) -> Result<(), EngineError> {
        self.resumed.lock().unwrap().push(id);
        Ok(())
    }

    fn resume_all(&self) -> Result<(), EngineError> {
        Ok(())
    }

    fn kill(&self, id: FlowId) -> Result<(), EngineError> {
        self.killed.lock().unwrap().push(id);
        Ok(())
    }

    fn replay(&self, flow: &Flow) -> Result<(), EngineError> {
        match &self.reject_replay {
            Some(reason) => Err(EngineError::Rejected(reason.clone())),
            None => {
                self.replayed.lock().unwrap().push(flow.id);
                Ok(())
            }
        }
    }
}

fn http_flow(host: &str) -> Flow {
    let mut f = Flow::new(FlowType::Http);
    f.request = Some(Request {
        method: "GET".into(),
        scheme: "https".into(),
        host: host.into(),
        port: 443,
        path: "/index.html".into(),
        http_version: "HTTP/1.1".into(),
        headers: Headers::from_pairs(vec![("Host".into(), host.into())]),
        body: b"request body".to_vec(),
        timestamp_start: None,
        timestamp_end: None,
        is_replay: false,
    });
    f.response = Some(Response {
        http_version: "HTTP/1.1".into(),
        status_code: 200,
        reason: "OK".into(),
        headers: Headers::from_pairs(vec![("Content-Type".into(), "text/html".into())]),
        body: b"<html></html>".to_vec(),
        timestamp_start: None,
        timestamp_end: None,
        is_replay: false,
    });
    f
}

fn start_plane(engine: Arc<dyn CaptureEngine>) -> (ControlHandle, EngineBridge) {
    let (_tx, shutdown_rx) = watch::channel(false);
    // keep the shutdown sender alive for the test's duration
    std::mem::forget(_tx);
    let (plane, handle, bridge) = ControlPlane::new(engine, shutdown_rx);
    tokio::spawn(plane.run());
    (handle, bridge)
}

fn start_filtered_plane(
    view: View,
    engine: Arc<dyn CaptureEngine>,
) -> (ControlHandle, EngineBridge) {
    let (_tx, shutdown_rx) = watch::channel(false);
    std::mem::forget(_tx);
    let (plane, handle, bridge) = ControlPlane::with_view(view, engine, shutdown_rx);
    tokio::spawn(plane.run());
    (handle, bridge)
}

async fn subscribe(handle: &ControlHandle) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    handle.subscribe(tx).await.unwrap();
    rx
}

fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(serde_json::from_str(&msg).unwrap());
    }
    out
}

/// Wait until every previously enqueued command has been processed by
/// issuing (and awaiting) a read through the same channel.
async fn settle(handle: &ControlHandle) {
    handle.list_flows().await.unwrap();
}

#[tokio::test]
async fn signal_order_matches_mutation_order_for_all_subscribers() {
    let (handle, bridge) = start_plane(Arc::new(DetachedEngine));
    let mut sub_a = subscribe(&handle).await;
    let mut sub_b = subscribe(&handle).await;

    let (a, b, c) = (http_flow("a.example"), http_flow("b.example"), http_flow("c.example"));
    let id_b = b.id;
    bridge.on_flow_created(a);
    bridge.on_flow_created(b);
    bridge.on_flow_created(c);
    handle.delete(id_b).await.unwrap();
    settle(&handle).await;

    for rx in [&mut sub_a, &mut sub_b] {
        let signals = drain(rx);
        let cmds: Vec<_> = signals.iter().map(|s| s["cmd"].as_str().unwrap().to_string()).collect();
        assert_eq!(cmds, vec!["add", "add", "add", "remove"]);
        assert_eq!(signals[3]["data"]["id"], id_b.to_string());
    }
}

#[tokio::test]
async fn failed_subscriber_does_not_stall_the_rest() {
    let (handle, bridge) = start_plane(Arc::new(DetachedEngine));
    let dead = subscribe(&handle).await;
    let mut live = subscribe(&handle).await;

    drop(dead);
    bridge.on_flow_created(http_flow("a.example"));
    settle(&handle).await;

    let signals = drain(&mut live);
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0]["cmd"], "add");
}

#[tokio::test]
async fn filtered_flow_is_invisible_until_it_matches() {
    let view = View::with_filter(Box::new(|f: &Flow| {
        f.request
            .as_ref()
            .map(|r| r.host == "keep.example")
            .unwrap_or(false)
    }));
    let (handle, bridge) = start_filtered_plane(view, Arc::new(DetachedEngine));
    let mut sub = subscribe(&handle).await;

    let flow = http_flow("drop.example");
    let id = flow.id;
    bridge.on_flow_created(flow.clone());
    settle(&handle).await;

    assert!(handle.list_flows().await.unwrap().is_empty());
    assert!(drain(&mut sub).is_empty());

    // update it into the filter: exactly one `add`, not an `update`
    let mut matching = flow;
    matching.request.as_mut().unwrap().host = "keep.example".into();
    bridge.on_flow_updated(matching);
    settle(&handle).await;

    let signals = drain(&mut sub);
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0]["cmd"], "add");
    assert_eq!(signals[0]["data"]["id"], id.to_string());

    let listed = handle.list_flows().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, id);
}

#[tokio::test]
async fn edit_takes_snapshot_and_revert_restores_it() {
    let (handle, bridge) = start_plane(Arc::new(DetachedEngine));
    let flow = http_flow("a.example");
    let id = flow.id;
    bridge.on_flow_created(flow);

    let patch = FlowPatch::from_json(&json!({
        "request": {"method": "POST", "path": "/edited"}
    }))
    .unwrap();
    handle.edit(id, patch).await.unwrap();

    let listed = handle.list_flows().await.unwrap();
    let req = listed[0].request.as_ref().unwrap();
    assert_eq!(req.method, "POST");
    assert_eq!(req.path, "/edited");

    handle.revert(id).await.unwrap();
    let listed = handle.list_flows().await.unwrap();
    let req = listed[0].request.as_ref().unwrap();
    assert_eq!(req.method, "GET");
    assert_eq!(req.path, "/index.html");
}

#[tokio::test]
async fn revert_without_snapshot_is_a_silent_noop() {
    let (handle, bridge) = start_plane(Arc::new(DetachedEngine));
    let flow = http_flow("a.example");
    let id = flow.id;
    bridge.on_flow_created(flow);
    settle(&handle).await;

    let mut sub = subscribe(&handle).await;
    handle.revert(id).await.unwrap();
    settle(&handle).await;

    assert!(drain(&mut sub).is_empty());
    let listed = handle.list_flows().await.unwrap();
    assert_eq!(listed[0].request.as_ref().unwrap().method, "GET");
}

#[tokio::test]
async fn clear_emits_one_reset_not_n_removes() {
    let (handle, bridge) = start_plane(Arc::new(DetachedEngine));
    for host in ["a.example", "b.example", "c.example"] {
        bridge.on_flow_created(http_flow(host));
    }
    settle(&handle).await;

    let mut sub = subscribe(&handle).await;
    handle.clear().await.unwrap();

    let signals = drain(&mut sub);
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0]["resource"], "flows");
    assert_eq!(signals[0]["cmd"], "reset");
    assert!(handle.list_flows().await.unwrap().is_empty());
}

#[tokio::test]
async fn export_import_round_trip_preserves_sequence() {
    let (handle, bridge) = start_plane(Arc::new(DetachedEngine));
    let flows: Vec<Flow> = ["a.example", "b.example", "c.example"]
        .iter()
        .map(|h| http_flow(h))
        .collect();
    let ids: Vec<FlowId> = flows.iter().map(|f| f.id).collect();
    for f in flows {
        bridge.on_flow_created(f);
    }

    let exported = handle.export_flows().await.unwrap();
    let mut buf = Vec::new();
    BinaryCodec.write(&mut buf, &exported).unwrap();

    // import into a second, empty plane
    let (other, _bridge) = start_plane(Arc::new(DetachedEngine));
    let decoded = BinaryCodec.read(&mut Cursor::new(buf)).unwrap();
    assert_eq!(other.import_flows(decoded).await.unwrap(), 3);

    let listed = other.list_flows().await.unwrap();
    let listed_ids: Vec<FlowId> = listed.iter().map(|s| s.id).collect();
    assert_eq!(listed_ids, ids);
    assert_eq!(listed[0].request.as_ref().unwrap().host, "a.example");
    assert_eq!(exported, handle.export_flows().await.unwrap());
}

#[tokio::test]
async fn import_clears_before_replaying_the_stream() {
    let (handle, bridge) = start_plane(Arc::new(DetachedEngine));
    bridge.on_flow_created(http_flow("stale.example"));
    settle(&handle).await;

    let mut sub = subscribe(&handle).await;
    let incoming = vec![http_flow("fresh.example")];
    handle.import_flows(incoming).await.unwrap();

    let signals = drain(&mut sub);
    let cmds: Vec<_> = signals.iter().map(|s| s["cmd"].as_str().unwrap().to_string()).collect();
    assert_eq!(cmds, vec!["reset", "add"]);

    let listed = handle.list_flows().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].request.as_ref().unwrap().host, "fresh.example");
}

#[tokio::test]
async fn partial_edit_touches_only_named_fields() {
    let (handle, bridge) = start_plane(Arc::new(DetachedEngine));
    let flow = http_flow("a.example");
    let id = flow.id;
    let original_headers = flow.response.as_ref().unwrap().headers.to_pairs();
    bridge.on_flow_created(flow);
    settle(&handle).await;

    let mut sub = subscribe(&handle).await;
    let patch = FlowPatch::from_json(&json!({"response": {"code": 404}})).unwrap();
    handle.edit(id, patch).await.unwrap();
    settle(&handle).await;

    let signals = drain(&mut sub);
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0]["cmd"], "update");
    assert_eq!(signals[0]["data"]["id"], id.to_string());

    let listed = handle.list_flows().await.unwrap();
    let resp = listed[0].response.as_ref().unwrap();
    assert_eq!(resp.status_code, 404);
    assert_eq!(resp.headers, original_headers);
    assert_eq!(resp.content_length, b"<html></html>".len());
}

#[tokio::test]
async fn rejected_replay_leaves_the_pending_state() {
    let engine = Arc::new(ScriptedEngine::rejecting_replay("target unreachable"));
    let (handle, bridge) = start_plane(engine);
    let flow = http_flow("a.example");
    let id = flow.id;
    bridge.on_flow_created(flow);

    let err = handle.replay(id).await.unwrap_err();
    assert!(matches!(err, ApiError::EngineRejected(_)));
    assert!(err.to_string().contains("target unreachable"));

    // the snapshot+clear happened before the engine was asked, and stays
    let listed = handle.list_flows().await.unwrap();
    assert!(listed[0].response.is_none());

    // revert undoes the pending state
    handle.revert(id).await.unwrap();
    let listed = handle.list_flows().await.unwrap();
    assert_eq!(listed[0].response.as_ref().unwrap().status_code, 200);
}

#[tokio::test]
async fn accepted_replay_reaches_the_engine() {
    let engine = Arc::new(ScriptedEngine::default());
    let (handle, bridge) = start_plane(engine.clone());
    let flow = http_flow("a.example");
    let id = flow.id;
    bridge.on_flow_created(flow);

    handle.replay(id).await.unwrap();
    assert_eq!(*engine.replayed.lock().unwrap(), vec![id]);
}

#[tokio::test]
async fn resume_unknown_flow_is_not_found() {
    let (handle, _bridge) = start_plane(Arc::new(DetachedEngine));
    let err = handle.resume(uuid::Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err, ApiError::NotFound);
}

#[tokio::test]
async fn resume_signals_engine_and_unpauses() {
    let engine = Arc::new(ScriptedEngine::default());
    let (handle, bridge) = start_plane(engine.clone());

    let mut flow = http_flow("a.example");
    flow.intercepted = true;
    let id = flow.id;
    bridge.on_flow_created(flow);
    settle(&handle).await;

    let mut sub = subscribe(&handle).await;
    handle.resume(id).await.unwrap();

    assert_eq!(*engine.resumed.lock().unwrap(), vec![id]);
    let listed = handle.list_flows().await.unwrap();
    assert!(!listed[0].intercepted);

    let signals = drain(&mut sub);
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0]["cmd"], "update");
    assert_eq!(signals[0]["data"]["intercepted"], false);
}

#[tokio::test]
async fn resume_all_unpauses_every_intercepted_flow() {
    let engine = Arc::new(ScriptedEngine::default());
    let (handle, bridge) = start_plane(engine);

    let mut paused = http_flow("a.example");
    paused.intercepted = true;
    let running = http_flow("b.example");
    bridge.on_flow_created(paused);
    bridge.on_flow_created(running);
    settle(&handle).await;

    assert_eq!(handle.resume_all().await.unwrap(), 1);
    let listed = handle.list_flows().await.unwrap();
    assert!(listed.iter().all(|f| !f.intercepted));
}

#[tokio::test]
async fn delete_kills_killable_flows_before_removal() {
    let engine = Arc::new(ScriptedEngine::default());
    let (handle, bridge) = start_plane(engine.clone());

    let mut killable = http_flow("a.example");
    killable.killable = true;
    let finished = http_flow("b.example");
    let (id_killable, id_finished) = (killable.id, finished.id);
    bridge.on_flow_created(killable);
    bridge.on_flow_created(finished);

    handle.delete(id_killable).await.unwrap();
    handle.delete(id_finished).await.unwrap();

    assert_eq!(*engine.killed.lock().unwrap(), vec![id_killable]);
    assert!(handle.list_flows().await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_inserts_a_copy_and_broadcasts_add() {
    let (handle, bridge) = start_plane(Arc::new(DetachedEngine));
    let flow = http_flow("a.example");
    let id = flow.id;
    bridge.on_flow_created(flow);
    settle(&handle).await;

    let mut sub = subscribe(&handle).await;
    let copy_id = handle.duplicate(id).await.unwrap();
    assert_ne!(copy_id, id);

    let signals = drain(&mut sub);
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0]["cmd"], "add");
    assert_eq!(signals[0]["data"]["id"], copy_id.to_string());

    let listed = handle.list_flows().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(
        listed[1].request.as_ref().unwrap().host,
        listed[0].request.as_ref().unwrap().host
    );
}

#[tokio::test]
async fn content_write_and_read_round_trip() {
    let (handle, bridge) = start_plane(Arc::new(DetachedEngine));
    let flow = http_flow("a.example");
    let id = flow.id;
    bridge.on_flow_created(flow);

    handle
        .write_content(id, MessagePart::Response, b"replaced".to_vec())
        .await
        .unwrap();

    let download = handle.read_content(id, MessagePart::Response).await.unwrap();
    assert_eq!(download.body, b"replaced");
    // no content-disposition on the message: filename from the request path
    assert_eq!(download.filename, "index.html");
}

#[tokio::test]
async fn unknown_transform_is_a_client_error() {
    let (handle, bridge) = start_plane(Arc::new(DetachedEngine));
    let flow = http_flow("a.example");
    let id = flow.id;
    bridge.on_flow_created(flow);

    let err = handle
        .render_content(id, MessagePart::Response, "protobuf")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));

    let rendered = handle
        .render_content(id, MessagePart::Response, "raw")
        .await
        .unwrap();
    assert_eq!(rendered.lines, vec!["<html></html>".to_string()]);
}

#[tokio::test]
async fn settings_update_broadcasts_exactly_the_changed_subset() {
    let (handle, _bridge) = start_plane(Arc::new(DetachedEngine));
    let mut sub = subscribe(&handle).await;

    let patch = json!({"http2": true, "bogus": 1}).as_object().unwrap().clone();
    let changed = handle.update_settings(patch).await.unwrap();
    assert_eq!(changed.len(), 1);
    settle(&handle).await;

    let signals = drain(&mut sub);
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0]["resource"], "settings");
    assert_eq!(signals[0]["cmd"], "update");
    assert_eq!(signals[0]["data"], json!({"http2": true}));

    let report = handle.settings().await.unwrap();
    assert!(report.settings.http2);
    assert!(report.content_views.contains(&"auto".to_string()));
}

#[tokio::test]
async fn engine_view_reset_is_broadcast_only() {
    let (handle, bridge) = start_plane(Arc::new(DetachedEngine));
    bridge.on_flow_created(http_flow("a.example"));
    settle(&handle).await;

    let mut sub = subscribe(&handle).await;
    bridge.on_view_reset();
    settle(&handle).await;

    let signals = drain(&mut sub);
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0]["cmd"], "reset");
    // the store itself is untouched
    assert_eq!(handle.list_flows().await.unwrap().len(), 1);
}

#[tokio::test]
async fn event_log_appends_are_broadcast() {
    let (handle, _bridge) = start_plane(Arc::new(DetachedEngine));
    let mut sub = subscribe(&handle).await;

    handle.log_event(flowdeck::events::LogLevel::Error, "capture file unreadable");
    settle(&handle).await;

    let signals = drain(&mut sub);
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0]["resource"], "events");
    assert_eq!(signals[0]["cmd"], "add");
    assert_eq!(signals[0]["data"]["message"], "capture file unreadable");

    let events = handle.events().await.unwrap();
    assert_eq!(events.len(), 1);
}
