//! Public API for the `wsbridge` library.
//!
//! This crate wires long-lived WebSocket connections into request-routing
//! applications. Applications implement [`SocketHandler`]; server endpoints
//! are declared as [`EndpointRegistration`]s, outbound connections as
//! [`ConnectionManager`]s, and a [`Registry`] deploys both once the
//! transport container is ready.
//!
//! The transport itself sits behind the [`ServerContainer`] and
//! [`ClientContainer`] traits. Enable the `tungstenite` feature for a
//! provider built on `tokio-tungstenite`.

pub mod client;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod extension;
pub mod handler;
pub mod handshake;
pub mod metrics;
pub mod panic;
pub mod properties;
pub mod registry;
pub mod server;
pub mod session;
pub mod transport;
#[cfg(feature = "tungstenite")]
pub mod tungstenite;

pub use client::{ClientEndpointConfig, ClientNegotiator, ConnectionManager, ConnectionState};
pub use codec::CodecRef;
pub use config::SocketConfig;
pub use dispatch::{Dispatcher, Endpoint, close_with_protocol_error};
pub use error::{
    ConfigError,
    DeploymentError,
    ExtensionParseError,
    HandlerError,
    HandlerResult,
    ResolveError,
    SocketError,
    TransportError,
};
pub use extension::{Extension, TransportExtension};
pub use handler::{HandlerResolver, SocketHandler};
pub use handshake::{HandshakeRequest, HandshakeResponse, Headers};
pub use properties::UserProperties;
pub use registry::Registry;
pub use server::{EndpointRegistration, EndpointSpec, HandshakeModifier};
pub use session::{CloseCode, CloseReason, Delivery, MessageHandlers, Session, SessionHandle, SessionId};
pub use transport::{ClientContainer, ContainerTuning, ServerContainer};
