//! In-memory transport container for registry and lifecycle tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::watch;
use url::Url;
use wsbridge::{
    ClientContainer,
    ClientEndpointConfig,
    CloseReason,
    ContainerTuning,
    DeploymentError,
    Endpoint,
    EndpointRegistration,
    ResolveError,
    ServerContainer,
    SessionHandle,
    TransportError,
};

use crate::session::MemorySession;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

/// Container double acting as both server and client container.
///
/// Server side: deployed registrations are kept by path and
/// [`open`](Self::open) simulates an inbound connection. Client side:
/// [`connect`](ClientContainer::connect) succeeds with a [`MemorySession`]
/// unless told to fail, and can be held at the handshake to observe
/// lifecycle races.
pub struct MemoryContainer {
    endpoints: Mutex<HashMap<String, Arc<EndpointRegistration>>>,
    rejected: Mutex<HashSet<String>>,
    tuning: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    fail_connects: AtomicBool,
    gate: watch::Sender<bool>,
    sessions: Mutex<Vec<Arc<MemorySession>>>,
}

impl Default for MemoryContainer {
    fn default() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            endpoints: Mutex::new(HashMap::new()),
            rejected: Mutex::new(HashSet::new()),
            tuning: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail_connects: AtomicBool::new(false),
            gate,
            sessions: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryContainer {
    /// Fresh shared container.
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    /// Refuse any later deployment at `path`.
    pub fn reject_path(&self, path: impl Into<String>) { lock(&self.rejected).insert(path.into()); }

    /// Paths currently deployed, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<_> = lock(&self.endpoints).keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Deployed registration for `path`.
    pub fn registration(&self, path: &str) -> Option<Arc<EndpointRegistration>> {
        lock(&self.endpoints).get(path).cloned()
    }

    /// Tuning calls received, rendered as `name=value`.
    pub fn tuning_calls(&self) -> Vec<String> { lock(&self.tuning).clone() }

    /// Simulate an inbound connection to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if no endpoint is deployed at `path` or its
    /// handler cannot be resolved.
    pub fn open(&self, path: &str) -> Result<MemoryConnection, ResolveError> {
        let registration = self
            .registration(path)
            .ok_or_else(|| ResolveError::new::<Self>(format!("no endpoint deployed at {path}")))?;
        let endpoint = registration.endpoint_instance()?;
        let session = MemorySession::with_details(
            registration.subprotocols().first().cloned(),
            registration.user_properties().clone(),
        );
        let handle: SessionHandle = session.clone();
        endpoint.on_open(&handle);
        Ok(MemoryConnection { session, endpoint })
    }

    /// Make later connects fail with [`TransportError::Connect`].
    pub fn fail_connects(&self) { self.fail_connects.store(true, Ordering::SeqCst); }

    /// Hold later connects at the handshake until [`release`](Self::release).
    pub fn hold(&self) { self.gate.send_replace(false); }

    /// Let held connects proceed.
    pub fn release(&self) { self.gate.send_replace(true); }

    /// Number of connect attempts made so far, including held ones.
    pub fn connect_attempts(&self) -> usize { self.attempts.load(Ordering::SeqCst) }

    /// Client sessions opened so far, in order.
    pub fn client_sessions(&self) -> Vec<Arc<MemorySession>> { lock(&self.sessions).clone() }

    fn record(&self, call: String) { lock(&self.tuning).push(call); }
}

impl ContainerTuning for MemoryContainer {
    fn set_async_send_timeout(&self, timeout: Duration) {
        self.record(format!("send_timeout={}", timeout.as_millis()));
    }

    fn set_max_session_idle_timeout(&self, timeout: Duration) {
        self.record(format!("idle_timeout={}", timeout.as_millis()));
    }

    fn set_max_text_message_buffer_size(&self, bytes: usize) { self.record(format!("max_text={bytes}")); }

    fn set_max_binary_message_buffer_size(&self, bytes: usize) {
        self.record(format!("max_binary={bytes}"));
    }
}

impl ServerContainer for MemoryContainer {
    fn add_endpoint(&self, registration: Arc<EndpointRegistration>) -> Result<(), DeploymentError> {
        let path = registration.path().to_owned();
        if lock(&self.rejected).contains(&path) {
            return Err(DeploymentError::Rejected {
                path,
                reason: "rejected by test".into(),
            });
        }
        let mut endpoints = lock(&self.endpoints);
        if endpoints.contains_key(&path) {
            return Err(DeploymentError::DuplicatePath(path));
        }
        endpoints.insert(path, registration);
        Ok(())
    }
}

#[async_trait]
impl ClientContainer for MemoryContainer {
    async fn connect(
        &self,
        endpoint: Arc<dyn Endpoint>,
        config: &ClientEndpointConfig,
        uri: &Url,
    ) -> Result<SessionHandle, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.subscribe();
        // The sender lives as long as `self`, so this only fails if the
        // container is being dropped.
        let _ = gate.wait_for(|open| *open).await;

        if self.fail_connects.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                uri: uri.to_string(),
                reason: "connection refused".into(),
            });
        }
        let session = MemorySession::with_details(
            config.preferred_subprotocols().first().cloned(),
            Default::default(),
        );
        lock(&self.sessions).push(session.clone());
        let handle: SessionHandle = session;
        endpoint.on_open(&handle);
        Ok(handle)
    }
}

/// Connection opened by [`MemoryContainer::open`].
pub struct MemoryConnection {
    /// Session backing the connection.
    pub session: Arc<MemorySession>,
    endpoint: Arc<dyn Endpoint>,
}

impl MemoryConnection {
    /// The session as seen by handlers.
    pub fn handle(&self) -> SessionHandle { self.session.clone() }

    /// Report a transport failure on the connection.
    pub fn fail(&self, error: TransportError) { self.endpoint.on_error(&self.handle(), error.into()); }

    /// Finish the connection, invoking the close callback with `reason`.
    pub fn close(self, reason: CloseReason) {
        self.session.drop_connection();
        self.endpoint.on_close(&self.handle(), &reason);
    }
}
