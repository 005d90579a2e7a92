//! Server container accepting WebSocket upgrades over TCP.

use std::{
    future::Future,
    io,
    net::SocketAddr,
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Duration,
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::FutureExt;
use log::{debug, error, info, warn};
use tokio::{
    net::{TcpListener, TcpStream, ToSocketAddrs},
    select,
    signal,
    time::sleep,
};
use tokio_tungstenite::{
    accept_hdr_async_with_config,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response},
        http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    },
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{
    driver::{self, Connection},
    limits::Limits,
    session::TungsteniteSession,
};
use crate::{
    error::DeploymentError,
    handshake::{HandshakeRequest, Headers, SEC_WEBSOCKET_PROTOCOL},
    panic::format_panic,
    properties::UserProperties,
    server::EndpointRegistration,
    session::{CloseReason, SessionHandle},
    transport::{ContainerTuning, ServerContainer},
};

/// Delay before retrying after a failed `accept`.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

/// WebSocket server routing upgrades to registered endpoints by path.
///
/// Cloning yields another handle to the same server. Hand a clone to
/// [`crate::Registry::on_container_ready`] and drive the server with
/// [`run_with_shutdown`](Self::run_with_shutdown).
#[derive(Clone)]
pub struct TungsteniteServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    listener: TcpListener,
    endpoints: DashMap<String, Arc<EndpointRegistration>>,
    limits: Limits,
}

/// Outcome of a successful upgrade negotiation.
struct Accepted {
    registration: Arc<EndpointRegistration>,
    subprotocol: Option<String>,
    properties: UserProperties,
}

impl TungsteniteServer {
    /// Bind a listener on `addr`.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if binding fails.
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener))
    }

    /// Serve on an already bound listener.
    #[must_use]
    pub fn from_listener(listener: TcpListener) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                listener,
                endpoints: DashMap::new(),
                limits: Limits::default(),
            }),
        }
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if the address cannot be read.
    pub fn local_addr(&self) -> io::Result<SocketAddr> { self.inner.listener.local_addr() }

    /// Paths currently served.
    #[must_use]
    pub fn paths(&self) -> Vec<String> { self.inner.endpoints.iter().map(|e| e.key().clone()).collect() }

    /// Serve until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Currently infallible; accept failures are logged and retried.
    pub async fn run(&self) -> io::Result<()> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Serve until `shutdown` resolves, then close live sessions with
    /// status 1001 and wait for their tasks to finish.
    ///
    /// # Errors
    ///
    /// Currently infallible; accept failures are logged and retried.
    pub async fn run_with_shutdown<F>(&self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        tokio::pin!(shutdown);
        loop {
            select! {
                () = &mut shutdown => break,
                accepted = self.inner.listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => self.spawn_connection(stream, peer_addr, &token, &tracker),
                    Err(e) => {
                        warn!("accept failed: error={e}");
                        sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
            }
        }
        info!("server shutting down: live_connections={}", tracker.len());
        token.cancel();
        tracker.close();
        tracker.wait().await;
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer_addr: SocketAddr, token: &CancellationToken, tracker: &TaskTracker) {
        let inner = Arc::clone(&self.inner);
        let token = token.clone();
        tracker.spawn(async move {
            let fut = AssertUnwindSafe(serve_connection(inner, stream, peer_addr, token)).catch_unwind();
            if let Err(panic) = fut.await {
                let panic_msg = format_panic(&panic);
                // Emit via both `log` and `tracing` for tests that capture either.
                error!("connection task panicked: panic={panic_msg}, peer_addr={peer_addr}");
                tracing::error!(panic = %panic_msg, %peer_addr, "connection task panicked");
            }
        });
    }
}

async fn serve_connection(inner: Arc<ServerInner>, stream: TcpStream, peer_addr: SocketAddr, shutdown: CancellationToken) {
    let limits = inner.limits.snapshot();
    let mut accepted = None;
    let callback = |request: &Request, response: Response| negotiate(&inner, request, response, &mut accepted);
    let mut ws = match accept_hdr_async_with_config(stream, callback, Some(limits.ws_config())).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("upgrade rejected: error={e}, peer_addr={peer_addr}");
            return;
        }
    };
    let Some(Accepted {
        registration,
        subprotocol,
        properties,
    }) = accepted
    else {
        return;
    };

    let endpoint = match registration.endpoint_instance() {
        Ok(endpoint) => endpoint,
        Err(e) => {
            error!("handler resolution failed: path={}, error={e}, peer_addr={peer_addr}", registration.path());
            let frame = driver::close_frame(&CloseReason::unexpected_condition());
            if let Err(e) = ws.close(Some(frame)).await {
                debug!("failed to close unresolved connection: error={e}, peer_addr={peer_addr}");
            }
            return;
        }
    };

    let (session, outbound) = TungsteniteSession::new(subprotocol, properties);
    let handle: SessionHandle = session.clone();
    debug!(
        "session opened: path={}, session={}, peer_addr={peer_addr}",
        registration.path(),
        handle.id()
    );
    endpoint.on_open(&handle);
    driver::drive(Connection {
        ws,
        session,
        endpoint,
        outbound,
        limits,
        shutdown,
    })
    .await;
}

fn reject(status: StatusCode, message: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message.to_owned()));
    *response.status_mut() = status;
    response
}

pub(super) fn to_headers(map: &HeaderMap) -> Headers {
    map.iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect()
}

pub(super) fn copy_headers(headers: &Headers, map: &mut HeaderMap) {
    for (name, value) in headers.iter() {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => warn!("skipping invalid handshake header: name={name:?}"),
        }
    }
}

fn negotiate(
    inner: &ServerInner,
    request: &Request,
    mut response: Response,
    accepted: &mut Option<Accepted>,
) -> Result<Response, ErrorResponse> {
    let path = request.uri().path();
    let Some(registration) = inner.endpoints.get(path).map(|e| Arc::clone(e.value())) else {
        return Err(reject(StatusCode::NOT_FOUND, "no endpoint registered for path"));
    };
    let mut ours = HandshakeRequest::new(path, to_headers(request.headers()));
    if let Some(query) = request.uri().query() {
        ours = ours.with_query(query);
    }
    if !registration.check_origin(ours.origin()) {
        debug!("origin rejected: path={path}, origin={:?}", ours.origin());
        return Err(reject(StatusCode::FORBIDDEN, "origin not allowed"));
    }

    let mut handshake = registration.handshake_response();
    if let Some(protocol) = registration.negotiated_subprotocol(&ours.requested_subprotocols()) {
        handshake.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocol);
    }
    let extensions = registration.negotiated_extensions(&ours.requested_extensions());
    if !extensions.is_empty() {
        debug!("extensions negotiated but not applied by this provider: path={path}, count={}", extensions.len());
    }
    registration.modify_handshake(&ours, &mut handshake);

    let (headers, properties) = handshake.into_parts();
    let subprotocol = headers.get(SEC_WEBSOCKET_PROTOCOL).map(str::to_owned);
    copy_headers(&headers, response.headers_mut());
    *accepted = Some(Accepted {
        registration,
        subprotocol,
        properties,
    });
    Ok(response)
}

impl ContainerTuning for TungsteniteServer {
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

impl ServerContainer for TungsteniteServer {
    fn add_endpoint(&self, registration: Arc<EndpointRegistration>) -> Result<(), DeploymentError> {
        match self.inner.endpoints.entry(registration.path().to_owned()) {
            Entry::Occupied(entry) => Err(DeploymentError::DuplicatePath(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!("endpoint deployed: path={}", entry.key());
                entry.insert(registration);
                Ok(())
            }
        }
    }
}
