//! Seams between this crate and a transport provider.
//!
//! A provider owns the handshake and framing. It exposes a
//! [`ServerContainer`] that accepts endpoint registrations and a
//! [`ClientContainer`] that opens outbound connections, and drives an
//! [`Endpoint`] for every connection either of them establishes.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use url::Url;

use crate::{
    client::ClientEndpointConfig,
    dispatch::Endpoint,
    error::{DeploymentError, TransportError},
    server::EndpointRegistration,
    session::SessionHandle,
};

/// Container-wide limits applied once before any endpoint is registered.
///
/// Implementations use interior mutability; setters may be called from the
/// bootstrap thread while the container is shared.
pub trait ContainerTuning: Send + Sync {
    /// Timeout for asynchronous sends.
    fn set_async_send_timeout(&self, timeout: Duration);

    /// Default time a session may stay idle before it is closed.
    fn set_max_session_idle_timeout(&self, timeout: Duration);

    /// Default maximum size of a buffered text message, in bytes.
    fn set_max_text_message_buffer_size(&self, bytes: usize);

    /// Default maximum size of a buffered binary message, in bytes.
    fn set_max_binary_message_buffer_size(&self, bytes: usize);
}

/// Container accepting inbound connections for registered endpoints.
pub trait ServerContainer: ContainerTuning {
    /// Deploy `registration`; from then on connections to its path are
    /// dispatched to [`EndpointRegistration::endpoint_instance`].
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentError`] if the container refuses the registration,
    /// for example because its path is already served.
    fn add_endpoint(&self, registration: Arc<EndpointRegistration>) -> Result<(), DeploymentError>;
}

/// Container opening outbound connections.
#[async_trait]
pub trait ClientContainer: ContainerTuning {
    /// Connect to `uri` and drive `endpoint` for the resulting session.
    ///
    /// Resolves once the opening handshake completes and
    /// [`Endpoint::on_open`] has run.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the connection or handshake fails.
    async fn connect(
        &self,
        endpoint: Arc<dyn Endpoint>,
        config: &ClientEndpointConfig,
        uri: &Url,
    ) -> Result<SessionHandle, TransportError>;
}
