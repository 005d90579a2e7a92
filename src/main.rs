//! Demo binary for `wsbridge`.
//!
//! `serve` registers an echo endpoint with the tungstenite provider and runs
//! until interrupted; `connect` opens a client connection and logs whatever
//! the peer sends.

mod cli;

use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command};
use tracing::{info, warn};
use wsbridge::{
    CloseReason,
    ConnectionManager,
    EndpointRegistration,
    HandlerResult,
    Registry,
    SessionHandle,
    SocketConfig,
    SocketError,
    SocketHandler,
    handler::{per_connection, shared},
    tungstenite::{TungsteniteClient, TungsteniteServer},
};

/// Sends every message straight back to the peer.
struct Echo;

impl SocketHandler for Echo {
    fn on_open(&self, session: &SessionHandle) -> HandlerResult {
        info!(session = %session.id(), "echo session opened");
        Ok(())
    }

    fn on_close(&self, session: &SessionHandle, reason: &CloseReason) -> HandlerResult {
        info!(session = %session.id(), code = %reason.code(), "echo session closed");
        Ok(())
    }

    fn on_text(&self, session: &SessionHandle, text: &str, _is_last: bool) {
        if let Err(e) = session.send_text(text) {
            warn!(session = %session.id(), error = %e, "echo failed");
        }
    }

    fn on_binary(&self, session: &SessionHandle, data: &[u8], _is_last: bool) {
        if let Err(e) = session.send_binary(data) {
            warn!(session = %session.id(), error = %e, "echo failed");
        }
    }

    fn on_error(&self, session: &SessionHandle, error: &SocketError) -> HandlerResult {
        warn!(session = %session.id(), error = %error, "echo session error");
        Ok(())
    }
}

/// Logs inbound traffic and optionally greets the peer.
struct Printer {
    greeting: Option<String>,
}

impl SocketHandler for Printer {
    fn on_open(&self, session: &SessionHandle) -> HandlerResult {
        info!(
            session = %session.id(),
            subprotocol = ?session.negotiated_subprotocol(),
            "connected"
        );
        if let Some(greeting) = &self.greeting {
            session.send_text(greeting)?;
        }
        Ok(())
    }

    fn on_close(&self, _session: &SessionHandle, reason: &CloseReason) -> HandlerResult {
        info!(code = %reason.code(), reason = reason.reason(), "disconnected");
        Ok(())
    }

    fn on_text(&self, _session: &SessionHandle, text: &str, _is_last: bool) {
        info!(text, "received text");
    }

    fn on_binary(&self, _session: &SessionHandle, data: &[u8], _is_last: bool) {
        info!(len = data.len(), "received binary");
    }

    fn on_error(&self, _session: &SessionHandle, error: &SocketError) -> HandlerResult {
        warn!(error = %error, "session error");
        Ok(())
    }
}

async fn serve(bind: &str, path: String) -> Result<(), Box<dyn std::error::Error>> {
    let server = TungsteniteServer::bind(bind).await?;
    info!(addr = %server.local_addr()?, path, "serving echo endpoint");

    let mut registry = Registry::new(SocketConfig::default());
    registry.register_server(EndpointRegistration::builder(path).handler(shared(Echo))?)?;
    registry.on_container_ready(Arc::new(server.clone()));

    let outcome = server.run().await;
    registry.teardown();
    Ok(outcome?)
}

async fn connect(
    uri: String,
    subprotocols: Vec<String>,
    greeting: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = TungsteniteClient::new();
    let manager = ConnectionManager::builder(uri, Arc::new(client.clone()))
        .preferred_subprotocols(subprotocols)
        .handler(per_connection(move || Printer {
            greeting: greeting.clone(),
        }))?;
    manager.start();

    tokio::signal::ctrl_c().await?;
    manager.stop();
    manager.wait_idle().await;
    client.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Enable structured logging for the demo.
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    match Cli::parse().command {
        Command::Serve { bind, path } => serve(&bind, path).await,
        Command::Connect {
            uri,
            subprotocol,
            message,
        } => connect(uri, subprotocol, message).await,
    }
}
