//! Request dispatch, the uniform auth gate, and hardened default headers.

use super::{handlers, updates};
use crate::codec::CaptureCodec;
use crate::error::ApiError;
use crate::flow::{FlowId, MessagePart};
use crate::plane::ControlHandle;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header;
use hyper::{Request, Response, StatusCode};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Shared state handed to every request.
pub(crate) struct AppState {
    /// Handle onto the control-plane loop.
    pub handle: ControlHandle,
    /// Capture-format codec used at the export/import boundary.
    pub codec: Arc<dyn CaptureCodec>,
    /// Optional bearer token for the uniform auth gate.
    pub auth_token: Option<String>,
}

/// Serve one request: auth gate, dispatch, error mapping, hardened
/// headers. Never fails; failures become status responses.
pub(crate) async fn route(state: Arc<AppState>, req: Request<Incoming>) -> Response<Full<Bytes>> {
    let response = dispatch(state, req)
        .await
        .unwrap_or_else(|err| error_response(&err));
    harden(response)
}

async fn dispatch(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, ApiError> {
    check_auth(&state, &req)?;

    let method = req.method().as_str().to_string();
    let path = req.uri().path().to_string();

    // the one upgradeable route; everything else is plain request/response
    if method == "GET" && path == "/updates" {
        return updates::handle(state, req).await;
    }

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match (method.as_str(), segments.as_slice()) {
        ("GET", ["flows"]) => handlers::list_flows(&state).await,
        ("GET", ["flows", "dump"]) => handlers::dump_flows(&state).await,
        ("POST", ["flows", "dump"]) => handlers::load_flows(&state, req).await,
        ("POST", ["flows", "accept"]) => handlers::accept_all(&state).await,
        ("POST", ["flows", id, "accept"]) => handlers::accept_one(&state, flow_id(id)?).await,
        ("DELETE", ["flows", id]) => handlers::delete_flow(&state, flow_id(id)?).await,
        ("PUT", ["flows", id]) => handlers::edit_flow(&state, flow_id(id)?, req).await,
        ("POST", ["flows", id, "duplicate"]) => {
            handlers::duplicate_flow(&state, flow_id(id)?).await
        }
        ("POST", ["flows", id, "revert"]) => handlers::revert_flow(&state, flow_id(id)?).await,
        ("POST", ["flows", id, "replay"]) => handlers::replay_flow(&state, flow_id(id)?).await,
        ("GET", ["flows", id, part, "content"]) => {
            handlers::get_content(&state, flow_id(id)?, message_part(part)?).await
        }
        ("POST", ["flows", id, part, "content"]) => {
            handlers::set_content(&state, flow_id(id)?, message_part(part)?, req).await
        }
        ("GET", ["flows", id, part, "content", transform]) => {
            handlers::render_content(&state, flow_id(id)?, message_part(part)?, transform).await
        }
        ("GET", ["settings"]) => handlers::get_settings(&state).await,
        ("PUT", ["settings"]) => handlers::put_settings(&state, req).await,
        ("GET", ["events"]) => handlers::list_events(&state).await,
        ("POST", ["clear"]) => handlers::clear_all(&state).await,
        _ => Ok(plain_response(StatusCode::NOT_FOUND, "no such endpoint")),
    }
}

/// Uniform pass/fail credential gate: runs before any handler logic,
/// including the update-channel handshake.
fn check_auth(state: &AppState, req: &Request<Incoming>) -> Result<(), ApiError> {
    let Some(expected) = state.auth_token.as_deref() else {
        return Ok(());
    };
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

fn flow_id(segment: &str) -> Result<FlowId, ApiError> {
    FlowId::from_str(segment).map_err(|_| ApiError::NotFound)
}

fn message_part(segment: &str) -> Result<MessagePart, ApiError> {
    MessagePart::from_segment(segment)
        .ok_or_else(|| ApiError::BadRequest(format!("no such message: {segment}")))
}

/// Build a plain-text response.
pub(crate) fn plain_response(status: StatusCode, text: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(text.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

fn error_response(err: &ApiError) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        warn!("request failed: {err}");
    }
    let mut response = plain_response(status, &err.to_string());
    if matches!(err, ApiError::Unauthorized) {
        response
            .headers_mut()
            .insert(header::WWW_AUTHENTICATE, header::HeaderValue::from_static("Bearer"));
    }
    response
}

/// Hardened default headers on every response: no embedding in foreign
/// frames, no content sniffing. A fixed cross-cutting policy, not a
/// per-handler decision.
fn harden(mut response: Response<Full<Bytes>>) -> Response<Full<Bytes>> {
    let headers = response.headers_mut();
    headers.insert(
        header::SERVER,
        header::HeaderValue::from_static(concat!("flowdeck/", env!("CARGO_PKG_VERSION"))),
    );
    headers.insert(
        "X-Frame-Options",
        header::HeaderValue::from_static("DENY"),
    );
    headers.insert(
        "X-Content-Type-Options",
        header::HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "X-XSS-Protection",
        header::HeaderValue::from_static("1; mode=block"),
    );
    response
}
