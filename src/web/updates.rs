//! The `/updates` duplex channel.
//!
//! A plain HTTP/1.1 upgrade to WebSocket. Traffic is server → client
//! only: each text message is one JSON-encoded signal. The connection's
//! outbound queue is registered with the broadcast registry on handshake
//! and deregistered when the pump observes a close or a send failure; a
//! slow or dead peer therefore only ever loses its own messages.

use super::router::AppState;
use crate::error::ApiError;
use futures_util::{SinkExt, StreamExt};
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{header, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

fn header_contains(req: &Request<Incoming>, name: header::HeaderName, needle: &str) -> bool {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains(needle))
        .unwrap_or(false)
}

/// Complete the WebSocket handshake and hand the connection to a pump
/// task. The subscriber is registered before the 101 goes out, so no
/// signal emitted after the handshake can be missed.
pub(crate) async fn handle(
    state: Arc<AppState>,
    mut req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, ApiError> {
    if !header_contains(&req, header::UPGRADE, "websocket")
        || !header_contains(&req, header::CONNECTION, "upgrade")
    {
        return Err(ApiError::BadRequest(
            "the update channel requires a websocket upgrade".to_string(),
        ));
    }
    let key = req
        .headers()
        .get(header::SEC_WEBSOCKET_KEY)
        .cloned()
        .ok_or_else(|| ApiError::BadRequest("missing Sec-WebSocket-Key".to_string()))?;
    let accept = derive_accept_key(key.as_bytes());

    let (tx, rx) = mpsc::unbounded_channel::<String>();
    let subscriber = state.handle.subscribe(tx).await?;

    let handle = state.handle.clone();
    tokio::spawn(async move {
        match hyper::upgrade::on(&mut req).await {
            Ok(upgraded) => {
                let ws = WebSocketStream::from_raw_socket(
                    TokioIo::new(upgraded),
                    Role::Server,
                    None,
                )
                .await;
                pump(ws, rx).await;
            }
            Err(e) => warn!("update-channel upgrade failed: {e}"),
        }
        handle.unsubscribe(subscriber);
    });

    Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::UPGRADE, "websocket")
        .header(header::CONNECTION, "Upgrade")
        .header(header::SEC_WEBSOCKET_ACCEPT, accept)
        .body(Full::new(Bytes::new()))
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// Drain the subscriber queue onto the socket until either side goes
/// away. Inbound frames are ignored apart from close handling; the
/// channel is server → client only.
async fn pump<S>(mut ws: WebSocketStream<S>, mut rx: mpsc::UnboundedReceiver<String>)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            outbound = rx.recv() => {
                match outbound {
                    Some(text) => {
                        if let Err(e) = ws.send(Message::Text(text)).await {
                            debug!("update-channel send failed: {e}");
                            break;
                        }
                    }
                    // the registry evicted this subscriber
                    None => {
                        let _ = ws.close(None).await;
                        break;
                    }
                }
            }
            inbound = ws.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("update-channel peer closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("update-channel receive failed: {e}");
                        break;
                    }
                }
            }
        }
    }
}
