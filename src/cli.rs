//! Command line interface for the `wsbridge` demo binary.

use clap::{Parser, Subcommand};

/// Command line arguments for the `wsbridge` binary.
#[derive(Debug, Parser)]
#[command(name = "wsbridge", version, about = "WebSocket echo endpoint and client demo")]
pub struct Cli {
    /// Mode to run in.
    #[command(subcommand)]
    pub command: Command,
}

/// Demo modes.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve an echo endpoint until interrupted.
    Serve {
        /// Socket address to listen on.
        #[arg(short, long, default_value = "127.0.0.1:9001")]
        bind: String,
        /// Path the echo endpoint is registered at.
        #[arg(short, long, default_value = "/echo")]
        path: String,
    },
    /// Connect to an endpoint and log every message received.
    Connect {
        /// Absolute `ws://` or `wss://` address.
        #[arg(short, long)]
        uri: String,
        /// Subprotocol to offer; may be repeated in preference order.
        #[arg(short, long)]
        subprotocol: Vec<String>,
        /// Text message sent once the session opens.
        #[arg(short, long)]
        message: Option<String>,
    },
}
