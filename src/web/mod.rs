//! HTTP surface of the control plane.
//!
//! A hyper 1.x server: each accepted connection gets its own task and is
//! served HTTP/1.1 with upgrade support, which the `/updates` WebSocket
//! channel relies on. The server owns nothing but a [`ControlHandle`] and
//! a codec; every operation goes through the control-plane loop.

mod handlers;
mod router;
mod updates;

use crate::codec::CaptureCodec;
use crate::plane::ControlHandle;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use router::AppState;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Errors from running the web server.
#[derive(Debug, Error)]
pub enum WebError {
    /// I/O error (binding, accepting).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the web server.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Address to bind on.
    pub listen_addr: SocketAddr,
    /// Bearer token required on every request and the update channel.
    /// `None` disables the gate.
    pub auth_token: Option<String>,
}

/// The control-plane web server.
pub struct WebServer {
    config: WebConfig,
    state: Arc<AppState>,
    shutdown_rx: watch::Receiver<bool>,
}

impl WebServer {
    /// Create a server over `handle`, exporting/importing captures
    /// through `codec`.
    pub fn new(
        config: WebConfig,
        handle: ControlHandle,
        codec: Arc<dyn CaptureCodec>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let state = Arc::new(AppState {
            handle,
            codec,
            auth_token: config.auth_token.clone(),
        });
        Self {
            config,
            state,
            shutdown_rx,
        }
    }

    /// Bind the configured address and run the accept loop until the
    /// shutdown signal flips.
    pub async fn run(self) -> Result<(), WebError> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve(listener).await
    }

    /// Run the accept loop on an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> Result<(), WebError> {
        if let Ok(addr) = listener.local_addr() {
            info!("web control plane listening on http://{addr}");
        }

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "accepted client connection");
                            self.spawn_connection_handler(stream);
                        }
                        Err(e) => {
                            warn!("failed to accept connection: {e}");
                        }
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("web server shutting down");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    fn spawn_connection_handler(&self, stream: tokio::net::TcpStream) {
        let state = self.state.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(router::route(state, req).await) }
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service)
                .with_upgrades()
                .await
            {
                // connection resets are routine, not errors
                let text = e.to_string();
                if text.contains("connection reset") || text.contains("broken pipe") {
                    debug!("connection ended: {e}");
                } else {
                    warn!("connection error: {e}");
                }
            }
        });
    }
}
