//! Session handle backed by a tungstenite connection task.

use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use crate::{
    error::TransportError,
    properties::UserProperties,
    session::{BinaryHandler, CloseReason, MessageHandlers, Session, SessionId, TextHandler},
};

/// Work queued for the connection task.
pub(super) enum Outbound {
    Message(Message),
    Close(CloseReason),
}

/// [`Session`] whose sends and closes are queued to the connection task.
pub(super) struct TungsteniteSession {
    id: SessionId,
    open: AtomicBool,
    subprotocol: Option<String>,
    properties: UserProperties,
    handlers: Mutex<Option<Arc<MessageHandlers>>>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl TungsteniteSession {
    pub(super) fn new(
        subprotocol: Option<String>,
        properties: UserProperties,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id: SessionId::next(),
            open: AtomicBool::new(true),
            subprotocol,
            properties,
            handlers: Mutex::new(None),
            outbound: tx,
        });
        (session, rx)
    }

    fn handlers(&self) -> Option<Arc<MessageHandlers>> {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Handlers for delivery, or `None` once the session is closed.
    fn live_handlers(&self) -> Option<Arc<MessageHandlers>> {
        if !self.is_open() {
            return None;
        }
        self.handlers()
    }

    /// Tungstenite assembles fragments, so every delivery is a whole message.
    pub(super) fn deliver_text(&self, text: &str) {
        if let Some(handlers) = self.live_handlers() {
            match &handlers.text {
                TextHandler::Whole(callback) => callback(text),
                TextHandler::Partial(callback) => callback(text, true),
            }
        }
    }

    pub(super) fn deliver_binary(&self, data: &[u8]) {
        if let Some(handlers) = self.live_handlers() {
            match &handlers.binary {
                BinaryHandler::Whole(callback) => callback(data),
                BinaryHandler::Partial(callback) => callback(data, true),
            }
        }
    }

    pub(super) fn deliver_pong(&self, payload: &[u8]) {
        if let Some(handlers) = self.live_handlers() {
            (handlers.pong)(payload);
        }
    }

    /// Mark closed, returning whether the session was open.
    pub(super) fn mark_closed(&self) -> bool { self.open.swap(false, Ordering::SeqCst) }

    fn enqueue(&self, message: Message) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(Outbound::Message(message))
            .map_err(|_| TransportError::Closed)
    }
}

impl Session for TungsteniteSession {
    fn id(&self) -> SessionId { self.id }

    fn is_open(&self) -> bool { self.open.load(Ordering::SeqCst) }

    fn negotiated_subprotocol(&self) -> Option<String> { self.subprotocol.clone() }

    fn user_properties(&self) -> UserProperties { self.properties.clone() }

    fn install_handlers(&self, handlers: MessageHandlers) {
        *self.handlers.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(handlers));
    }

    fn send_text(&self, text: &str) -> Result<(), TransportError> { self.enqueue(Message::text(text.to_owned())) }

    fn send_binary(&self, data: &[u8]) -> Result<(), TransportError> {
        self.enqueue(Message::binary(Bytes::copy_from_slice(data)))
    }

    fn send_ping(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.enqueue(Message::Ping(Bytes::copy_from_slice(payload)))
    }

    /// Closing an already closed session is a no-op.
    fn close(&self, reason: CloseReason) -> Result<(), TransportError> {
        if !self.mark_closed() {
            return Ok(());
        }
        self.outbound
            .send(Outbound::Close(reason))
            .map_err(|_| TransportError::Closed)
    }
}

impl fmt::Debug for TungsteniteSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TungsteniteSession")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .field("subprotocol", &self.subprotocol)
            .finish_non_exhaustive()
    }
}
