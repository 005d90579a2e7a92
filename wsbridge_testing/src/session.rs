//! In-memory [`Session`] recording everything sent through it.

use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use wsbridge::{
    CloseReason,
    Delivery,
    MessageHandlers,
    Session,
    SessionId,
    TransportError,
    UserProperties,
    session::{BinaryHandler, TextHandler},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

/// Session double for dispatcher and lifecycle tests.
///
/// Inbound traffic is injected with the `receive_*` methods. In whole-message
/// mode fragments are buffered and delivered once the final fragment
/// arrives, as a real container would.
pub struct MemorySession {
    id: SessionId,
    open: AtomicBool,
    subprotocol: Option<String>,
    properties: UserProperties,
    handlers: Mutex<Option<Arc<MessageHandlers>>>,
    text_buffer: Mutex<String>,
    binary_buffer: Mutex<Vec<u8>>,
    sent_text: Mutex<Vec<String>>,
    sent_binary: Mutex<Vec<Vec<u8>>>,
    closes: Mutex<Vec<CloseReason>>,
    fail_close: AtomicBool,
    panic_on_close: AtomicBool,
}

impl MemorySession {
    /// Open session without subprotocol or properties.
    pub fn new() -> Arc<Self> { Self::with_details(None, UserProperties::default()) }

    /// Open session with the given negotiation results.
    pub fn with_details(subprotocol: Option<String>, properties: UserProperties) -> Arc<Self> {
        Arc::new(Self {
            id: SessionId::next(),
            open: AtomicBool::new(true),
            subprotocol,
            properties,
            handlers: Mutex::new(None),
            text_buffer: Mutex::new(String::new()),
            binary_buffer: Mutex::new(Vec::new()),
            sent_text: Mutex::new(Vec::new()),
            sent_binary: Mutex::new(Vec::new()),
            closes: Mutex::new(Vec::new()),
            fail_close: AtomicBool::new(false),
            panic_on_close: AtomicBool::new(false),
        })
    }

    /// Make every later `close` return an error.
    pub fn fail_closes(&self) { self.fail_close.store(true, Ordering::SeqCst); }

    /// Make every later `close` panic.
    pub fn panic_on_close(&self) { self.panic_on_close.store(true, Ordering::SeqCst); }

    /// Close requests received, in order.
    pub fn closes(&self) -> Vec<CloseReason> { lock(&self.closes).clone() }

    /// Text messages sent by the handler.
    pub fn sent_text(&self) -> Vec<String> { lock(&self.sent_text).clone() }

    /// Binary messages sent by the handler.
    pub fn sent_binary(&self) -> Vec<Vec<u8>> { lock(&self.sent_binary).clone() }

    /// Delivery mode of the installed handlers, if any.
    pub fn delivery(&self) -> Option<Delivery> { lock(&self.handlers).as_ref().map(|h| h.delivery()) }

    /// Mark the session closed as if the peer disconnected.
    pub fn drop_connection(&self) { self.open.store(false, Ordering::SeqCst); }

    fn handlers(&self) -> Option<Arc<MessageHandlers>> { lock(&self.handlers).clone() }

    /// Inject one text fragment.
    pub fn receive_text_fragment(&self, fragment: &str, is_last: bool) {
        let Some(handlers) = self.handlers() else {
            return;
        };
        match &handlers.text {
            TextHandler::Partial(callback) => callback(fragment, is_last),
            TextHandler::Whole(callback) => {
                let message = {
                    let mut buffer = lock(&self.text_buffer);
                    buffer.push_str(fragment);
                    is_last.then(|| std::mem::take(&mut *buffer))
                };
                if let Some(message) = message {
                    callback(&message);
                }
            }
        }
    }

    /// Inject a complete text message.
    pub fn receive_text(&self, text: &str) { self.receive_text_fragment(text, true); }

    /// Inject one binary fragment.
    pub fn receive_binary_fragment(&self, fragment: &[u8], is_last: bool) {
        let Some(handlers) = self.handlers() else {
            return;
        };
        match &handlers.binary {
            BinaryHandler::Partial(callback) => callback(fragment, is_last),
            BinaryHandler::Whole(callback) => {
                let message = {
                    let mut buffer = lock(&self.binary_buffer);
                    buffer.extend_from_slice(fragment);
                    is_last.then(|| std::mem::take(&mut *buffer))
                };
                if let Some(message) = message {
                    callback(&message);
                }
            }
        }
    }

    /// Inject a complete binary message.
    pub fn receive_binary(&self, data: &[u8]) { self.receive_binary_fragment(data, true); }

    /// Inject a pong frame.
    pub fn receive_pong(&self, payload: &[u8]) {
        if let Some(handlers) = self.handlers() {
            (handlers.pong)(payload);
        }
    }
}

impl Session for MemorySession {
    fn id(&self) -> SessionId { self.id }

    fn is_open(&self) -> bool { self.open.load(Ordering::SeqCst) }

    fn negotiated_subprotocol(&self) -> Option<String> { self.subprotocol.clone() }

    fn user_properties(&self) -> UserProperties { self.properties.clone() }

    fn install_handlers(&self, handlers: MessageHandlers) { *lock(&self.handlers) = Some(Arc::new(handlers)); }

    fn send_text(&self, text: &str) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        lock(&self.sent_text).push(text.to_owned());
        Ok(())
    }

    fn send_binary(&self, data: &[u8]) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        lock(&self.sent_binary).push(data.to_vec());
        Ok(())
    }

    fn send_ping(&self, _payload: &[u8]) -> Result<(), TransportError> {
        if self.is_open() { Ok(()) } else { Err(TransportError::Closed) }
    }

    fn close(&self, reason: CloseReason) -> Result<(), TransportError> {
        lock(&self.closes).push(reason);
        assert!(!self.panic_on_close.load(Ordering::SeqCst), "close panicked on purpose");
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::Protocol("close refused".into()));
        }
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySession")
            .field("id", &self.id)
            .field("open", &self.is_open())
            .field("subprotocol", &self.subprotocol)
            .finish_non_exhaustive()
    }
}
