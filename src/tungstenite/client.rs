//! Client container opening WebSocket connections.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, info};
use tokio_tungstenite::{connect_async_with_config, tungstenite::client::IntoClientRequest};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use url::Url;

use super::{
    driver::{self, Connection},
    limits::Limits,
    server::{copy_headers, to_headers},
    session::TungsteniteSession,
};
use crate::{
    client::ClientEndpointConfig,
    dispatch::Endpoint,
    error::TransportError,
    handshake::{HandshakeResponse, SEC_WEBSOCKET_PROTOCOL},
    properties::UserProperties,
    session::SessionHandle,
    transport::{ClientContainer, ContainerTuning},
};

/// Client container; one instance can serve many connection managers.
///
/// Cloning yields another handle to the same container.
#[derive(Clone, Default)]
pub struct TungsteniteClient {
    inner: Arc<ClientInner>,
}

#[derive(Default)]
struct ClientInner {
    limits: Limits,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl TungsteniteClient {
    /// New container with default limits.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Close every live connection with status 1001 and wait for their
    /// tasks to finish. Later connects are closed immediately.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

#[async_trait]
impl ClientContainer for TungsteniteClient {
    async fn connect(
        &self,
        endpoint: Arc<dyn Endpoint>,
        config: &ClientEndpointConfig,
        uri: &Url,
    ) -> Result<SessionHandle, TransportError> {
        let connect_error = |reason: String| TransportError::Connect {
            uri: uri.to_string(),
            reason,
        };
        let mut request = uri
            .as_str()
            .into_client_request()
            .map_err(|e| connect_error(e.to_string()))?;
        copy_headers(&config.request_headers(), request.headers_mut());

        let limits = self.inner.limits.snapshot();
        let (ws, response) = connect_async_with_config(request, Some(limits.ws_config()), false)
            .await
            .map_err(|e| connect_error(e.to_string()))?;

        let handshake = HandshakeResponse::new(to_headers(response.headers()), UserProperties::default());
        config.after_response(&handshake);
        let subprotocol = handshake
            .headers()
            .get(SEC_WEBSOCKET_PROTOCOL)
            .map(str::to_owned);

        let (session, outbound) = TungsteniteSession::new(subprotocol, UserProperties::default());
        let handle: SessionHandle = session.clone();
        info!("client session opened: uri={uri}, session={}", handle.id());
        endpoint.on_open(&handle);
        debug!("client session handed to driver: session={}", handle.id());
        self.inner.tracker.spawn(driver::drive(Connection {
            ws,
            session,
            endpoint,
            outbound,
            limits,
            shutdown: self.inner.shutdown.clone(),
        }));
        Ok(handle)
    }
}

impl ContainerTuning for TungsteniteClient {
    fn set_async_send_timeout(&self, timeout: Duration) { self.inner.limits.set_async_send_timeout(timeout); }

    fn set_max_session_idle_timeout(&self, timeout: Duration) {
        self.inner.limits.set_max_session_idle_timeout(timeout);
    }

    fn set_max_text_message_buffer_size(&self, bytes: usize) {
        self.inner.limits.set_max_text_message_buffer_size(bytes);
    }

    fn set_max_binary_message_buffer_size(&self, bytes: usize) {
        self.inner.limits.set_max_binary_message_buffer_size(bytes);
    }
}
