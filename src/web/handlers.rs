//! One handler per control-surface operation.
//!
//! Handlers stay thin: parse the request, call the control handle, shape
//! the response. All flow-store logic lives behind the handle.

use super::router::{plain_response, AppState};
use crate::error::ApiError;
use crate::events::LogLevel;
use crate::flow::{FlowId, FlowPatch, MessagePart};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{header, Request, Response, StatusCode};
use serde::Serialize;
use std::io::Cursor;

type HandlerResult = Result<Response<Full<Bytes>>, ApiError>;

async fn body_bytes(req: Request<Incoming>) -> Result<Bytes, ApiError> {
    req.into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| ApiError::BadRequest(format!("failed to read request body: {e}")))
}

fn parse_json(bytes: &[u8]) -> Result<serde_json::Value, ApiError> {
    serde_json::from_slice(bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))
}

fn json_response<T: Serialize>(value: &T) -> HandlerResult {
    let body = serde_json::to_vec(value)
        .map_err(|e| ApiError::Internal(format!("failed to encode response: {e}")))?;
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

fn empty_ok() -> HandlerResult {
    Ok(plain_response(StatusCode::OK, ""))
}

pub(crate) async fn list_flows(state: &AppState) -> HandlerResult {
    json_response(&state.handle.list_flows().await?)
}

pub(crate) async fn dump_flows(state: &AppState) -> HandlerResult {
    let flows = state.handle.export_flows().await?;
    let mut buf = Vec::new();
    state
        .codec
        .write(&mut buf, &flows)
        .map_err(|e| ApiError::Internal(format!("failed to serialize capture: {e}")))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, "attachment; filename=flows")
        .body(Full::new(Bytes::from(buf)))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

pub(crate) async fn load_flows(state: &AppState, req: Request<Incoming>) -> HandlerResult {
    let bytes = body_bytes(req).await?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("missing upload body".to_string()));
    }
    let flows = state
        .codec
        .read(&mut Cursor::new(bytes.as_ref()))
        .map_err(|e| {
            state
                .handle
                .log_event(LogLevel::Error, format!("could not read capture stream: {e}"));
            ApiError::BadRequest(format!("could not read capture stream: {e}"))
        })?;
    state.handle.import_flows(flows).await?;
    empty_ok()
}

pub(crate) async fn accept_all(state: &AppState) -> HandlerResult {
    state.handle.resume_all().await?;
    empty_ok()
}

pub(crate) async fn accept_one(state: &AppState, id: FlowId) -> HandlerResult {
    state.handle.resume(id).await?;
    empty_ok()
}

pub(crate) async fn delete_flow(state: &AppState, id: FlowId) -> HandlerResult {
    state.handle.delete(id).await?;
    empty_ok()
}

pub(crate) async fn edit_flow(
    state: &AppState,
    id: FlowId,
    req: Request<Incoming>,
) -> HandlerResult {
    let bytes = body_bytes(req).await?;
    let payload = parse_json(&bytes)?;
    let patch = FlowPatch::from_json(&payload)?;
    state.handle.edit(id, patch).await?;
    empty_ok()
}

pub(crate) async fn duplicate_flow(state: &AppState, id: FlowId) -> HandlerResult {
    state.handle.duplicate(id).await?;
    empty_ok()
}

pub(crate) async fn revert_flow(state: &AppState, id: FlowId) -> HandlerResult {
    state.handle.revert(id).await?;
    empty_ok()
}

pub(crate) async fn replay_flow(state: &AppState, id: FlowId) -> HandlerResult {
    state.handle.replay(id).await?;
    empty_ok()
}

pub(crate) async fn get_content(state: &AppState, id: FlowId, part: MessagePart) -> HandlerResult {
    let download = state.handle.read_content(id, part).await?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/text")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename={}", download.filename),
        );
    if let Some(encoding) = &download.content_encoding {
        builder = builder.header(header::CONTENT_ENCODING, encoding);
    }
    builder
        .body(Full::new(Bytes::from(download.body)))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

pub(crate) async fn set_content(
    state: &AppState,
    id: FlowId,
    part: MessagePart,
    req: Request<Incoming>,
) -> HandlerResult {
    let bytes = body_bytes(req).await?;
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("missing upload body".to_string()));
    }
    state.handle.write_content(id, part, bytes.to_vec()).await?;
    empty_ok()
}

pub(crate) async fn render_content(
    state: &AppState,
    id: FlowId,
    part: MessagePart,
    transform: &str,
) -> HandlerResult {
    json_response(&state.handle.render_content(id, part, transform).await?)
}

pub(crate) async fn get_settings(state: &AppState) -> HandlerResult {
    json_response(&state.handle.settings().await?)
}

pub(crate) async fn put_settings(state: &AppState, req: Request<Incoming>) -> HandlerResult {
    let bytes = body_bytes(req).await?;
    let payload = parse_json(&bytes)?;
    let patch = payload
        .as_object()
        .cloned()
        .ok_or_else(|| ApiError::BadRequest("settings payload must be a JSON object".to_string()))?;
    state.handle.update_settings(patch).await?;
    empty_ok()
}

pub(crate) async fn list_events(state: &AppState) -> HandlerResult {
    json_response(&state.handle.events().await?)
}

pub(crate) async fn clear_all(state: &AppState) -> HandlerResult {
    state.handle.clear().await?;
    empty_ok()
}
