//! Translation of transport events into [`SocketHandler`] calls.
//!
//! [`Dispatcher`] is the single point where transport providers hand
//! connection events to application code, for accepted and initiated
//! connections alike. Every handler call runs inside `catch_unwind`, and any
//! failure is contained here:
//!
//! - open and error callback failures close the session with status 1011 and
//!   reason `SERVER_ERROR`;
//! - close callback failures are only logged;
//! - panics in message callbacks are reported through the error callback.
//!
//! Nothing raised by a handler, or by the close attempt that follows it,
//! reaches the transport.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Weak},
};

use crate::{
    error::{HandlerResult, ResolveError, SocketError},
    handler::{HandlerResolver, SocketHandler},
    metrics::{self, Phase},
    panic::format_panic,
    session::{BinaryHandler, CloseReason, MessageHandlers, Session, SessionHandle, TextHandler},
};

/// Object-safe view of a dispatcher, driven by transport providers.
pub trait Endpoint: Send + Sync {
    /// The connection opened; wire message handlers and notify the handler.
    fn on_open(&self, session: &SessionHandle);

    /// The connection closed.
    fn on_close(&self, session: &SessionHandle, reason: &CloseReason);

    /// The transport reported an error on the connection.
    fn on_error(&self, session: &SessionHandle, error: SocketError);

    /// Type name of the wrapped handler, for diagnostics.
    fn handler_type(&self) -> &'static str;
}

/// Type-erased constructor producing a fresh [`Endpoint`] per connection.
pub(crate) type EndpointFactory = Arc<dyn Fn() -> Result<Arc<dyn Endpoint>, ResolveError> + Send + Sync>;

/// Erase `resolver` into an [`EndpointFactory`] wrapping each handler in a
/// [`Dispatcher`].
pub(crate) fn endpoint_factory<H, R>(resolver: R) -> EndpointFactory
where
    H: SocketHandler,
    R: HandlerResolver<H>,
{
    Arc::new(move || {
        let handler = resolver.resolve()?;
        Ok(Arc::new(Dispatcher::new(handler)) as Arc<dyn Endpoint>)
    })
}

/// Adapter wrapping one handler instance.
pub struct Dispatcher<H> {
    handler: Arc<H>,
}

impl<H: SocketHandler> Dispatcher<H> {
    /// Wrap `handler`.
    #[must_use]
    pub fn new(handler: Arc<H>) -> Self { Self { handler } }

    /// The wrapped handler.
    #[must_use]
    pub fn handler(&self) -> &Arc<H> { &self.handler }

    fn partial_delivery(&self) -> bool {
        catch_unwind(AssertUnwindSafe(|| self.handler.partial_delivery())).unwrap_or(false)
    }

    /// Build the handlers installed on `session` when it opens.
    ///
    /// The closures hold a weak session reference so a session storing its
    /// own handlers does not keep itself alive.
    fn message_handlers(&self, session: &SessionHandle) -> MessageHandlers {
        let partial = self.partial_delivery();
        let text = {
            let (handler, weak) = (Arc::clone(&self.handler), Arc::downgrade(session));
            if partial {
                TextHandler::Partial(Box::new(move |text: &str, is_last: bool| {
                    with_session(&weak, |s| {
                        guard_message(&*handler, s, || handler.on_text(s, text, is_last));
                    });
                }))
            } else {
                TextHandler::Whole(Box::new(move |text: &str| {
                    with_session(&weak, |s| {
                        guard_message(&*handler, s, || handler.on_text(s, text, true));
                    });
                }))
            }
        };
        let binary = {
            let (handler, weak) = (Arc::clone(&self.handler), Arc::downgrade(session));
            if partial {
                BinaryHandler::Partial(Box::new(move |data: &[u8], is_last: bool| {
                    with_session(&weak, |s| {
                        guard_message(&*handler, s, || handler.on_binary(s, data, is_last));
                    });
                }))
            } else {
                BinaryHandler::Whole(Box::new(move |data: &[u8]| {
                    with_session(&weak, |s| {
                        guard_message(&*handler, s, || handler.on_binary(s, data, true));
                    });
                }))
            }
        };
        let pong = {
            let (handler, weak) = (Arc::clone(&self.handler), Arc::downgrade(session));
            Box::new(move |payload: &[u8]| {
                with_session(&weak, |s| {
                    guard_message(&*handler, s, || handler.on_pong(s, payload));
                });
            })
        };
        MessageHandlers { text, binary, pong }
    }
}

impl<H: SocketHandler> Endpoint for Dispatcher<H> {
    fn on_open(&self, session: &SessionHandle) {
        session.install_handlers(self.message_handlers(session));
        if let Err(failure) = invoke(|| self.handler.on_open(session)) {
            metrics::inc_handler_errors(Phase::Open);
            close_with_protocol_error(session, &failure);
        }
    }

    fn on_close(&self, session: &SessionHandle, reason: &CloseReason) {
        if let Err(failure) = invoke(|| self.handler.on_close(session, reason)) {
            metrics::inc_handler_errors(Phase::Close);
            tracing::error!(
                session = %session.id(),
                error = %failure,
                "unhandled error in close callback"
            );
        }
    }

    fn on_error(&self, session: &SessionHandle, error: SocketError) {
        deliver_error(&*self.handler, session, &error);
    }

    fn handler_type(&self) -> &'static str { std::any::type_name::<H>() }
}

/// Close `session` with status 1011 after a handler failure.
///
/// Logs `cause`, then sends the close only if the session is still open.
/// Errors and panics from the close attempt are swallowed.
pub fn close_with_protocol_error(session: &SessionHandle, cause: &SocketError) {
    tracing::error!(
        session = %session.id(),
        error = %cause,
        "closing session due to handler failure"
    );
    let attempt = catch_unwind(AssertUnwindSafe(|| {
        if session.is_open() {
            session.close(CloseReason::unexpected_condition())
        } else {
            Ok(())
        }
    }));
    match attempt {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::debug!(session = %session.id(), error = %e, "close after handler failure failed");
        }
        Err(panic) => {
            tracing::debug!(
                session = %session.id(),
                panic = %format_panic(&panic),
                "close after handler failure panicked"
            );
        }
    }
}

/// Run a fallible handler callback, converting errors and panics.
fn invoke<F>(callback: F) -> Result<(), SocketError>
where
    F: FnOnce() -> HandlerResult,
{
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SocketError::Handler(e)),
        Err(panic) => Err(SocketError::HandlerPanic(format_panic(&panic).to_string())),
    }
}

fn deliver_error<H: SocketHandler>(handler: &H, session: &SessionHandle, error: &SocketError) {
    if let Err(failure) = invoke(|| handler.on_error(session, error)) {
        metrics::inc_handler_errors(Phase::Error);
        close_with_protocol_error(session, &failure);
    }
}

fn guard_message<H, F>(handler: &H, session: &SessionHandle, callback: F)
where
    H: SocketHandler,
    F: FnOnce(),
{
    if let Err(panic) = catch_unwind(AssertUnwindSafe(callback)) {
        metrics::inc_handler_errors(Phase::Message);
        let error = SocketError::HandlerPanic(format_panic(&panic).to_string());
        deliver_error(handler, session, &error);
    }
}

fn with_session<F>(weak: &Weak<dyn Session>, f: F)
where
    F: FnOnce(&SessionHandle),
{
    if let Some(session) = weak.upgrade() {
        f(&session);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    use tracing_test::traced_test;

    use super::*;
    use crate::{
        error::TransportError,
        properties::UserProperties,
        session::{Session, SessionId},
    };

    #[derive(Debug, Default)]
    struct StubSession {
        open: AtomicBool,
        closes: Mutex<Vec<CloseReason>>,
        handlers: Mutex<Option<MessageHandlers>>,
        fail_close: bool,
    }

    impl StubSession {
        fn open() -> Arc<Self> {
            Arc::new(Self {
                open: AtomicBool::new(true),
                ..Self::default()
            })
        }
    }

    impl Session for StubSession {
        fn id(&self) -> SessionId { SessionId::new(7) }
        fn is_open(&self) -> bool { self.open.load(Ordering::SeqCst) }
        fn negotiated_subprotocol(&self) -> Option<String> { None }
        fn user_properties(&self) -> UserProperties { UserProperties::default() }
        fn install_handlers(&self, handlers: MessageHandlers) {
            *self.handlers.lock().expect("handlers lock") = Some(handlers);
        }
        fn send_text(&self, _text: &str) -> Result<(), TransportError> { Ok(()) }
        fn send_binary(&self, _data: &[u8]) -> Result<(), TransportError> { Ok(()) }
        fn send_ping(&self, _payload: &[u8]) -> Result<(), TransportError> { Ok(()) }
        fn close(&self, reason: CloseReason) -> Result<(), TransportError> {
            self.closes.lock().expect("closes lock").push(reason);
            if self.fail_close {
                return Err(TransportError::Closed);
            }
            self.open.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FailingOpen {
        errors: AtomicUsize,
    }

    impl SocketHandler for FailingOpen {
        fn on_open(&self, _session: &SessionHandle) -> HandlerResult { Err("open failed".into()) }
        fn on_close(&self, _session: &SessionHandle, _reason: &CloseReason) -> HandlerResult {
            panic!("close boom")
        }
        fn on_text(&self, _session: &SessionHandle, _text: &str, _is_last: bool) {
            panic!("text boom")
        }
        fn on_binary(&self, _session: &SessionHandle, _data: &[u8], _is_last: bool) {}
        fn on_error(&self, _session: &SessionHandle, _error: &SocketError) -> HandlerResult {
            self.errors.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn open_failure_closes_once_with_fixed_reason() {
        let stub = StubSession::open();
        let session: SessionHandle = stub.clone();
        Dispatcher::new(Arc::new(FailingOpen::default())).on_open(&session);

        let closes = stub.closes.lock().expect("closes lock");
        assert_eq!(closes.as_slice(), &[CloseReason::unexpected_condition()]);
    }

    #[test]
    fn failing_close_attempt_is_swallowed() {
        let stub = Arc::new(StubSession {
            open: AtomicBool::new(true),
            fail_close: true,
            ..StubSession::default()
        });
        let session: SessionHandle = stub.clone();
        Dispatcher::new(Arc::new(FailingOpen::default())).on_open(&session);
        assert_eq!(stub.closes.lock().expect("closes lock").len(), 1);
    }

    #[test]
    #[traced_test]
    fn close_callback_panic_is_contained() {
        let stub = StubSession::open();
        let session: SessionHandle = stub.clone();
        Dispatcher::new(Arc::new(FailingOpen::default())).on_close(&session, &CloseReason::normal());
        assert!(stub.closes.lock().expect("closes lock").is_empty());
        assert!(logs_contain("unhandled error in close callback"));
        assert!(logs_contain("close boom"));
    }

    #[test]
    fn message_panic_is_routed_to_error_callback() {
        let stub = StubSession::open();
        let session: SessionHandle = stub.clone();
        let handler = Arc::new(FailingOpen::default());
        Dispatcher::new(Arc::clone(&handler)).on_open(&session);

        let handlers = stub.handlers.lock().expect("handlers lock");
        match handlers.as_ref().map(|h| &h.text) {
            Some(TextHandler::Whole(callback)) => callback("hi"),
            _ => panic!("expected whole-message text handler"),
        }
        assert_eq!(handler.errors.load(Ordering::SeqCst), 1);
    }
}
