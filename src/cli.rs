//! Command-line interface definitions for flowdeck.
//!
//! Uses clap's derive API for type-safe argument parsing.

use clap::Parser;
use std::path::PathBuf;

/// Live web control plane for intercepted traffic flows.
///
/// flowdeck serves the flow store over HTTP plus a WebSocket update
/// channel. Run standalone it acts as a capture-file viewer; embedded, a
/// capture engine feeds it live flows through the engine bridge.
#[derive(Parser, Debug)]
#[command(name = "flowdeck")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Interface to bind the web server on.
    #[arg(long = "listen-host", value_name = "ADDR", default_value = "127.0.0.1")]
    pub listen_host: String,

    /// Port to bind the web server on.
    #[arg(short = 'p', long = "listen-port", value_name = "PORT", default_value_t = 8081)]
    pub listen_port: u16,

    /// Require this bearer token on every request.
    ///
    /// Without it, anyone who can reach the listen address can read and
    /// mutate the flow store.
    #[arg(long = "auth-token", value_name = "TOKEN")]
    pub auth_token: Option<String>,

    /// Capture file to preload into the store at startup.
    #[arg(short = 'r', long = "rfile", value_name = "PATH")]
    pub rfile: Option<PathBuf>,

    /// Increase log verbosity.
    ///
    /// Can be specified multiple times:
    /// -v    = info level
    /// -vv   = debug level
    /// -vvv  = trace level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}
