//! Builder for [`ConnectionManager`].

use std::sync::Arc;

use tokio::runtime::Handle;
use url::Url;

use super::{ClientEndpointConfig, ClientNegotiator, ConnectionManager};
use crate::{
    codec::CodecRef,
    dispatch,
    error::ConfigError,
    extension::Extension,
    handler::{HandlerResolver, SocketHandler},
    transport::ClientContainer,
};

/// Collects client connection settings; finished by
/// [`handler`](Self::handler).
///
/// ```no_run
/// # use std::sync::Arc;
/// # use wsbridge::{ClientContainer, ConnectionManager, handler};
/// # use wsbridge::{CloseReason, HandlerResult, SessionHandle, SocketError, SocketHandler};
/// # struct Feed;
/// # impl SocketHandler for Feed {
/// #     fn on_open(&self, _: &SessionHandle) -> HandlerResult { Ok(()) }
/// #     fn on_close(&self, _: &SessionHandle, _: &CloseReason) -> HandlerResult { Ok(()) }
/// #     fn on_text(&self, _: &SessionHandle, _: &str, _: bool) {}
/// #     fn on_binary(&self, _: &SessionHandle, _: &[u8], _: bool) {}
/// #     fn on_error(&self, _: &SessionHandle, _: &SocketError) -> HandlerResult { Ok(()) }
/// # }
/// # fn container() -> Arc<dyn ClientContainer> { unimplemented!() }
/// # #[tokio::main]
/// # async fn main() -> Result<(), wsbridge::ConfigError> {
/// let manager = ConnectionManager::builder("ws://127.0.0.1:9000/feed", container())
///     .preferred_subprotocol("feed.v1")
///     .auto_start(true)
///     .handler(handler::shared(Feed))?;
/// manager.start();
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct ConnectionManagerBuilder {
    uri: String,
    container: Arc<dyn ClientContainer>,
    config: ClientEndpointConfig,
    auto_start: bool,
    runtime: Option<Handle>,
}

impl ConnectionManagerBuilder {
    pub(super) fn new(uri: String, container: Arc<dyn ClientContainer>) -> Self {
        Self {
            uri,
            container,
            config: ClientEndpointConfig::default(),
            auto_start: false,
            runtime: None,
        }
    }

    /// Offer a subprotocol.
    pub fn preferred_subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.config.preferred_subprotocols.push(protocol.into());
        self
    }

    /// Offer several subprotocols, in preference order.
    pub fn preferred_subprotocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config
            .preferred_subprotocols
            .extend(protocols.into_iter().map(Into::into));
        self
    }

    /// Offer an extension.
    pub fn extension(mut self, extension: Extension) -> Self {
        self.config.extensions.push(extension);
        self
    }

    /// Register encoder type `T`.
    pub fn encoder<T: ?Sized + 'static>(mut self) -> Self {
        self.config.encoders.push(CodecRef::of::<T>());
        self
    }

    /// Register decoder type `T`.
    pub fn decoder<T: ?Sized + 'static>(mut self) -> Self {
        self.config.decoders.push(CodecRef::of::<T>());
        self
    }

    /// Customise the client side of the handshake.
    pub fn negotiator<N>(mut self, negotiator: N) -> Self
    where
        N: ClientNegotiator + 'static,
    {
        self.config.negotiator = Some(Arc::new(negotiator));
        self
    }

    /// Connect automatically when the registry becomes ready.
    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Runtime the connect task is spawned on. Defaults to the runtime the
    /// builder is finished in.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Attach the handler resolver and build the manager.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUri`] or [`ConfigError::RelativeUri`]
    /// for an unusable uri, and [`ConfigError::NoRuntime`] when no runtime
    /// was supplied and none is current.
    pub fn handler<H, R>(self, resolver: R) -> Result<ConnectionManager, ConfigError>
    where
        H: SocketHandler,
        R: HandlerResolver<H>,
    {
        let uri = parse_uri(&self.uri)?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| ConfigError::NoRuntime)?,
        };
        Ok(ConnectionManager::assemble(
            uri,
            std::any::type_name::<H>(),
            dispatch::endpoint_factory(resolver),
            self.config,
            self.container,
            self.auto_start,
            runtime,
        ))
    }
}

fn parse_uri(raw: &str) -> Result<Url, ConfigError> {
    let uri = Url::parse(raw.trim()).map_err(|e| match e {
        url::ParseError::RelativeUrlWithoutBase => ConfigError::RelativeUri(raw.to_owned()),
        other => ConfigError::InvalidUri {
            uri: raw.to_owned(),
            reason: other.to_string(),
        },
    })?;
    match uri.scheme() {
        "ws" | "wss" if uri.has_host() => Ok(uri),
        _ => Err(ConfigError::RelativeUri(raw.to_owned())),
    }
}
