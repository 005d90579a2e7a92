//! Handler double recording every callback.

use std::sync::{Mutex, PoisonError};

use wsbridge::{CloseReason, HandlerResult, SessionHandle, SocketError, SocketHandler};

/// A callback observed by [`RecordingHandler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// `on_open`.
    Open,
    /// `on_close` with the reported reason.
    Close(CloseReason),
    /// `on_text` with payload and `is_last`.
    Text(String, bool),
    /// `on_binary` with payload and `is_last`.
    Binary(Vec<u8>, bool),
    /// `on_pong` with payload.
    Pong(Vec<u8>),
    /// `on_error` with the rendered error.
    Error(String),
}

/// Failure injected into a callback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Fault {
    /// Callbacks succeed.
    #[default]
    None,
    /// The callback returns an error.
    Error,
    /// The callback panics.
    Panic,
}

/// Handler recording callbacks, optionally echoing messages and failing
/// on demand.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<Event>>,
    partial: bool,
    echo: bool,
    open_fault: Fault,
    error_fault: Fault,
    panic_on_text: bool,
}

impl RecordingHandler {
    /// Handler that records and succeeds.
    pub fn new() -> Self { Self::default() }

    /// Request fragment-by-fragment delivery.
    #[must_use]
    pub fn partial(mut self) -> Self {
        self.partial = true;
        self
    }

    /// Echo every text and binary message back.
    #[must_use]
    pub fn echoing(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Fail `on_open` with `fault`.
    #[must_use]
    pub fn open_fault(mut self, fault: Fault) -> Self {
        self.open_fault = fault;
        self
    }

    /// Fail `on_error` with `fault`.
    #[must_use]
    pub fn error_fault(mut self, fault: Fault) -> Self {
        self.error_fault = fault;
        self
    }

    /// Panic inside `on_text`.
    #[must_use]
    pub fn panicking_on_text(mut self) -> Self {
        self.panic_on_text = true;
        self
    }

    /// Callbacks observed so far.
    pub fn events(&self) -> Vec<Event> { self.events.lock().unwrap_or_else(PoisonError::into_inner).clone() }

    /// Number of recorded events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }

    fn record(&self, event: Event) { self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event); }
}

fn apply(fault: Fault, callback: &str) -> HandlerResult {
    match fault {
        Fault::None => Ok(()),
        Fault::Error => Err(format!("{callback} failed on purpose").into()),
        Fault::Panic => panic!("{callback} panicked on purpose"),
    }
}

impl SocketHandler for RecordingHandler {
    fn on_open(&self, _session: &SessionHandle) -> HandlerResult {
        self.record(Event::Open);
        apply(self.open_fault, "on_open")
    }

    fn on_close(&self, _session: &SessionHandle, reason: &CloseReason) -> HandlerResult {
        self.record(Event::Close(reason.clone()));
        Ok(())
    }

    fn on_text(&self, session: &SessionHandle, text: &str, is_last: bool) {
        self.record(Event::Text(text.to_owned(), is_last));
        assert!(!self.panic_on_text, "on_text panicked on purpose");
        if self.echo {
            let _ = session.send_text(text);
        }
    }

    fn on_binary(&self, session: &SessionHandle, data: &[u8], is_last: bool) {
        self.record(Event::Binary(data.to_vec(), is_last));
        if self.echo {
            let _ = session.send_binary(data);
        }
    }

    fn on_pong(&self, _session: &SessionHandle, payload: &[u8]) { self.record(Event::Pong(payload.to_vec())); }

    fn on_error(&self, _session: &SessionHandle, error: &SocketError) -> HandlerResult {
        self.record(Event::Error(error.to_string()));
        apply(self.error_fault, "on_error")
    }

    fn partial_delivery(&self) -> bool { self.partial }
}
