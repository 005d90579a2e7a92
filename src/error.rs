//! Error types shared across registration, lifecycle and dispatch.

use std::io;

use thiserror::Error;

/// Error type returned by application handler callbacks.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by fallible [`crate::SocketHandler`] callbacks.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Configuration errors raised while building or registering endpoints.
///
/// These are unrecoverable for the single registration concerned but never
/// abort a batch of registrations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// An extension was declared with an empty or blank name.
    #[error("extension name must not be blank")]
    BlankExtensionName,
    /// An extension name, parameter key or parameter value was not an HTTP
    /// token.
    #[error("{0:?} is not a valid extension token")]
    InvalidExtensionToken(String),
    /// An endpoint was declared with an empty or blank path.
    #[error("endpoint path must not be blank")]
    BlankPath,
    /// An endpoint path did not start with `/`.
    #[error("endpoint path {0:?} must start with '/'")]
    RelativePath(String),
    /// A client uri could not be parsed.
    #[error("invalid uri {uri:?}: {reason}")]
    InvalidUri {
        /// The rejected input.
        uri: String,
        /// Parser diagnostic.
        reason: String,
    },
    /// A client uri was not an absolute `ws://` or `wss://` address.
    #[error("uri {0:?} must be an absolute ws:// or wss:// address")]
    RelativeUri(String),
    /// Another registration already claimed this path.
    #[error("endpoint path {0:?} is already registered")]
    DuplicatePath(String),
    /// A registration was mutated after being handed to the container.
    #[error("endpoint {path:?} is frozen and can no longer be modified")]
    Frozen {
        /// Path of the frozen registration.
        path: String,
    },
    /// A connection manager was built outside a Tokio runtime without an
    /// explicit runtime handle.
    #[error("no Tokio runtime available; supply one with `runtime(handle)`")]
    NoRuntime,
}

/// Errors raised by a transport provider.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Socket-level failure.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),
    /// The outbound connection could not be established.
    #[error("failed to connect to {uri}: {reason}")]
    Connect {
        /// Target address.
        uri: String,
        /// Provider diagnostic.
        reason: String,
    },
    /// The opening handshake was rejected.
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// The session is no longer open.
    #[error("session is closed")]
    Closed,
    /// The peer violated the protocol or the provider failed mid-session.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Errors raised when a container refuses an endpoint registration.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeploymentError {
    /// The container already serves this path.
    #[error("an endpoint is already deployed at {0:?}")]
    DuplicatePath(String),
    /// The container rejected the registration for a provider-specific reason.
    #[error("endpoint {path:?} rejected: {reason}")]
    Rejected {
        /// Path of the rejected registration.
        path: String,
        /// Provider diagnostic.
        reason: String,
    },
}

/// Failure to obtain a handler instance from a resolver.
#[derive(Debug, Error)]
#[error("failed to resolve handler {handler}: {reason}")]
pub struct ResolveError {
    /// Type name of the requested handler.
    pub handler: &'static str,
    /// Resolver diagnostic.
    pub reason: String,
}

impl ResolveError {
    /// Construct a resolution error for handler type `H`.
    pub fn new<H: ?Sized>(reason: impl Into<String>) -> Self {
        Self {
            handler: std::any::type_name::<H>(),
            reason: reason.into(),
        }
    }
}

/// Errors delivered to [`crate::SocketHandler::on_error`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SocketError {
    /// The transport reported a failure on the session.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// A handler callback returned an error.
    #[error("handler failed: {0}")]
    Handler(#[source] HandlerError),
    /// A handler callback panicked.
    #[error("handler panicked: {0}")]
    HandlerPanic(String),
    /// No handler instance could be resolved for the connection.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Error returned when parsing a malformed extension string.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExtensionParseError {
    /// The extension name segment was missing or blank.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A parameter segment had a blank key.
    #[error("extension {extension:?} has a parameter with a blank key")]
    BlankParameterKey {
        /// Name of the extension being parsed.
        extension: String,
    },
}
