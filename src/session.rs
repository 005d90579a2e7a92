//! Live connection handles and the message wiring installed on them.
//!
//! A [`Session`] is the transport provider's handle for one open connection.
//! The dispatcher wires [`MessageHandlers`] onto it when the connection opens;
//! the provider then invokes those handlers for every inbound message.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{error::TransportError, properties::UserProperties};

/// Reason string sent when a connection is closed because a handler failed.
pub const SERVER_ERROR_REASON: &str = "SERVER_ERROR";

/// Identifier assigned to a session by its transport provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl From<u64> for SessionId {
    fn from(value: u64) -> Self { Self(value) }
}

impl SessionId {
    /// Create a new [`SessionId`] with the provided value.
    #[must_use]
    pub fn new(id: u64) -> Self { Self(id) }

    /// Allocate a process-unique identifier.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "SessionId({})", self.0) }
}

/// WebSocket close status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CloseCode(u16);

impl CloseCode {
    /// 1000: the purpose of the connection was fulfilled.
    pub const NORMAL_CLOSURE: CloseCode = CloseCode(1000);
    /// 1001: an endpoint is going away.
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    /// 1002: protocol error.
    pub const PROTOCOL_ERROR: CloseCode = CloseCode(1002);
    /// 1005: no status code was present.
    pub const NO_STATUS_CODE: CloseCode = CloseCode(1005);
    /// 1006: the connection dropped without a close frame.
    pub const CLOSED_ABNORMALLY: CloseCode = CloseCode(1006);
    /// 1009: a message exceeded the configured buffer size.
    pub const MESSAGE_TOO_BIG: CloseCode = CloseCode(1009);
    /// 1011: the server hit an unexpected condition.
    pub const UNEXPECTED_CONDITION: CloseCode = CloseCode(1011);

    /// Wrap a raw status code.
    #[must_use]
    pub const fn new(code: u16) -> Self { Self(code) }

    /// Raw status code.
    #[must_use]
    pub const fn as_u16(self) -> u16 { self.0 }
}

impl From<u16> for CloseCode {
    fn from(value: u16) -> Self { Self(value) }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Close code plus human-readable reason.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseReason {
    code: CloseCode,
    reason: String,
}

impl CloseReason {
    /// Build a close reason.
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Normal closure without a reason phrase.
    #[must_use]
    pub fn normal() -> Self { Self::new(CloseCode::NORMAL_CLOSURE, "") }

    /// The fixed diagnostic used when a handler failure forces a close.
    #[must_use]
    pub fn unexpected_condition() -> Self {
        Self::new(CloseCode::UNEXPECTED_CONDITION, SERVER_ERROR_REASON)
    }

    /// Status code.
    #[must_use]
    pub fn code(&self) -> CloseCode { self.code }

    /// Reason phrase, possibly empty.
    #[must_use]
    pub fn reason(&self) -> &str { &self.reason }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

/// Callback receiving a complete text message.
pub type WholeTextCallback = Box<dyn Fn(&str) + Send + Sync>;
/// Callback receiving a text fragment and whether it ends the message.
pub type PartialTextCallback = Box<dyn Fn(&str, bool) + Send + Sync>;
/// Callback receiving a complete binary message.
pub type WholeBinaryCallback = Box<dyn Fn(&[u8]) + Send + Sync>;
/// Callback receiving a binary fragment and whether it ends the message.
pub type PartialBinaryCallback = Box<dyn Fn(&[u8], bool) + Send + Sync>;
/// Callback receiving a pong payload.
pub type PongCallback = Box<dyn Fn(&[u8]) + Send + Sync>;

/// How text messages are delivered.
///
/// With [`TextHandler::Whole`] the provider must assemble fragments and invoke
/// the callback once per logical message.
pub enum TextHandler {
    /// One call per complete message.
    Whole(WholeTextCallback),
    /// One call per fragment as it arrives.
    Partial(PartialTextCallback),
}

/// How binary messages are delivered.
pub enum BinaryHandler {
    /// One call per complete message.
    Whole(WholeBinaryCallback),
    /// One call per fragment as it arrives.
    Partial(PartialBinaryCallback),
}

/// Message delivery mode selected when a connection opens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Providers assemble fragments before delivery.
    Whole,
    /// Providers forward fragments as they arrive.
    Partial,
}

/// Handlers wired onto a session when it opens.
pub struct MessageHandlers {
    /// Text message handler.
    pub text: TextHandler,
    /// Binary message handler.
    pub binary: BinaryHandler,
    /// Keepalive (pong) handler.
    pub pong: PongCallback,
}

impl MessageHandlers {
    /// Delivery mode of the installed text and binary handlers.
    #[must_use]
    pub fn delivery(&self) -> Delivery {
        match self.text {
            TextHandler::Whole(_) => Delivery::Whole,
            TextHandler::Partial(_) => Delivery::Partial,
        }
    }
}

impl fmt::Debug for MessageHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageHandlers")
            .field("delivery", &self.delivery())
            .finish_non_exhaustive()
    }
}

/// A live connection owned by a transport provider.
///
/// All operations are non-blocking: sends and closes enqueue work for the
/// provider's connection task and return immediately.
pub trait Session: Send + Sync + fmt::Debug {
    /// Provider-assigned identifier.
    fn id(&self) -> SessionId;

    /// Whether the connection is still open.
    fn is_open(&self) -> bool;

    /// Subprotocol agreed during the handshake, if any.
    fn negotiated_subprotocol(&self) -> Option<String>;

    /// Snapshot of the properties bound to this session.
    fn user_properties(&self) -> UserProperties;

    /// Replace the message handlers invoked for inbound traffic.
    fn install_handlers(&self, handlers: MessageHandlers);

    /// Queue a text message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the session is no longer open.
    fn send_text(&self, text: &str) -> Result<(), TransportError>;

    /// Queue a binary message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the session is no longer open.
    fn send_binary(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Queue a ping frame.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the session is no longer open.
    fn send_ping(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Begin the closing handshake with `reason`.
    ///
    /// # Errors
    ///
    /// Returns an error if the close frame could not be queued.
    fn close(&self, reason: CloseReason) -> Result<(), TransportError>;
}

/// Shared handle to a live session.
pub type SessionHandle = Arc<dyn Session>;
