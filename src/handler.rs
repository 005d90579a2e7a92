//! Application handler interface and instance resolution.
//!
//! Applications implement [`SocketHandler`] once and reuse it for server
//! endpoints and outbound connections. A [`HandlerResolver`] decides whether
//! each connection shares one instance or receives a fresh one.

use std::sync::Arc;

use crate::{
    error::{HandlerResult, ResolveError, SocketError},
    session::{CloseReason, SessionHandle},
};

/// Connection lifecycle and message callbacks implemented by applications.
///
/// Failures returned (or panics raised) from any callback are contained by
/// the [`crate::Dispatcher`]: open and error failures close the connection
/// with status 1011, close failures are logged.
///
/// ```
/// use wsbridge::{CloseReason, HandlerResult, SessionHandle, SocketError, SocketHandler};
///
/// struct Echo;
///
/// impl SocketHandler for Echo {
///     fn on_open(&self, _session: &SessionHandle) -> HandlerResult { Ok(()) }
///
///     fn on_close(&self, _session: &SessionHandle, _reason: &CloseReason) -> HandlerResult {
///         Ok(())
///     }
///
///     fn on_text(&self, session: &SessionHandle, text: &str, _is_last: bool) {
///         let _ = session.send_text(text);
///     }
///
///     fn on_binary(&self, session: &SessionHandle, data: &[u8], _is_last: bool) {
///         let _ = session.send_binary(data);
///     }
///
///     fn on_error(&self, _session: &SessionHandle, _error: &SocketError) -> HandlerResult {
///         Ok(())
///     }
/// }
/// ```
pub trait SocketHandler: Send + Sync + 'static {
    /// Called once the connection is open and message handlers are wired.
    ///
    /// # Errors
    ///
    /// An error closes the connection with status 1011.
    fn on_open(&self, session: &SessionHandle) -> HandlerResult;

    /// Called after the connection closed.
    ///
    /// # Errors
    ///
    /// Errors are logged; the connection is already gone.
    fn on_close(&self, session: &SessionHandle, reason: &CloseReason) -> HandlerResult;

    /// Called for each text message, or each fragment when
    /// [`partial_delivery`](Self::partial_delivery) is enabled.
    fn on_text(&self, session: &SessionHandle, text: &str, is_last: bool);

    /// Called for each binary message, or each fragment when
    /// [`partial_delivery`](Self::partial_delivery) is enabled.
    fn on_binary(&self, session: &SessionHandle, data: &[u8], is_last: bool);

    /// Called when a pong frame arrives.
    fn on_pong(&self, _session: &SessionHandle, _payload: &[u8]) {}

    /// Called when the transport reports an error on the session or a
    /// message callback panics.
    ///
    /// # Errors
    ///
    /// An error closes the connection with status 1011.
    fn on_error(&self, session: &SessionHandle, error: &SocketError) -> HandlerResult;

    /// Whether fragments are forwarded as they arrive.
    ///
    /// Read once when the connection opens. Defaults to `false`, in which case
    /// each message callback receives a complete message with `is_last` set.
    fn partial_delivery(&self) -> bool { false }
}

/// Supplies handler instances for new connections.
pub trait HandlerResolver<H>: Send + Sync + 'static {
    /// Return the handler for one connection.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if no instance can be produced.
    fn resolve(&self) -> Result<Arc<H>, ResolveError>;
}

impl<H, F> HandlerResolver<H> for F
where
    F: Fn() -> Result<Arc<H>, ResolveError> + Send + Sync + 'static,
{
    fn resolve(&self) -> Result<Arc<H>, ResolveError> { self() }
}

/// Resolver returning the same instance for every connection.
pub struct SharedInstance<H>(Arc<H>);

impl<H> SharedInstance<H> {
    /// Share an existing `Arc`.
    pub fn from_arc(handler: Arc<H>) -> Self { Self(handler) }
}

impl<H: Send + Sync + 'static> HandlerResolver<H> for SharedInstance<H> {
    fn resolve(&self) -> Result<Arc<H>, ResolveError> { Ok(Arc::clone(&self.0)) }
}

/// Resolver constructing a fresh instance for every connection.
pub struct PerConnection<F>(F);

impl<H, F> HandlerResolver<H> for PerConnection<F>
where
    F: Fn() -> H + Send + Sync + 'static,
    H: Send + Sync + 'static,
{
    fn resolve(&self) -> Result<Arc<H>, ResolveError> { Ok(Arc::new((self.0)())) }
}

/// Share `handler` across all connections.
pub fn shared<H>(handler: H) -> SharedInstance<H> { SharedInstance(Arc::new(handler)) }

/// Build a new handler with `factory` for each connection.
pub fn per_connection<H, F>(factory: F) -> PerConnection<F>
where
    F: Fn() -> H + Send + Sync + 'static,
{
    PerConnection(factory)
}
