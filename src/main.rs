//! flowdeck binary: standalone control-plane server.
//!
//! Without an embedding capture engine this process acts as a capture
//! viewer/editor: flows come from a preloaded capture file (`--rfile`) or
//! an import over the wire, and replay instructions are rejected by the
//! detached engine stand-in. Embedders construct [`flowdeck::plane::ControlPlane`]
//! directly and wire their engine to the bridge instead.

use anyhow::{Context, Result};
use clap::Parser;
use flowdeck::cli::Cli;
use flowdeck::codec::{BinaryCodec, CaptureCodec};
use flowdeck::engine::DetachedEngine;
use flowdeck::events::LogLevel;
use flowdeck::plane::ControlPlane;
use flowdeck::web::{WebConfig, WebServer};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;
    debug!("parsed CLI arguments: {:?}", cli);

    let listen_addr: SocketAddr = format!("{}:{}", cli.listen_host, cli.listen_port)
        .parse()
        .context("invalid listen address")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (plane, handle, bridge) =
        ControlPlane::new(Arc::new(DetachedEngine), shutdown_rx.clone());
    let plane_task = tokio::spawn(plane.run());

    if let Some(path) = &cli.rfile {
        match std::fs::File::open(path)
            .map_err(anyhow::Error::from)
            .and_then(|mut f| BinaryCodec.read(&mut f).map_err(anyhow::Error::from))
        {
            Ok(flows) => {
                info!("preloading {} flows from {}", flows.len(), path.display());
                for flow in flows {
                    bridge.on_flow_created(flow);
                }
            }
            Err(e) => {
                handle.log_event(
                    LogLevel::Error,
                    format!("could not read capture file {}: {e}", path.display()),
                );
            }
        }
    }

    let shutdown_on_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = shutdown_on_signal.send(true);
        }
    });

    let config = WebConfig {
        listen_addr,
        auth_token: cli.auth_token.clone(),
    };
    let codec: Arc<dyn CaptureCodec> = Arc::new(BinaryCodec);
    let server = WebServer::new(config, handle, codec, shutdown_rx);
    server.run().await.context("web server failed")?;

    let _ = shutdown_tx.send(true);
    plane_task.await.context("control plane task panicked")?;
    Ok(())
}

fn init_tracing(verbose: u8) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("failed to initialize tracing subscriber")?;

    Ok(())
}
