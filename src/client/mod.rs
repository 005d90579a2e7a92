//! Outbound connection lifecycle management.
//!
//! A [`ConnectionManager`] owns one outbound connection. `start` spawns an
//! asynchronous connect attempt on a lazily created worker and returns at
//! once; `stop` closes the session and retires the worker. Both are
//! idempotent and serialise through a single lock, and a connect attempt
//! that completes after `stop` (or after a newer `start`) closes its session
//! instead of publishing it.

mod builder;
mod config;
mod state;

use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

pub use builder::ConnectionManagerBuilder;
pub use config::{ClientEndpointConfig, ClientNegotiator};
use futures::FutureExt;
use log::{debug, error, info, warn};
pub use state::ConnectionState;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::Instrument;
use url::Url;

use crate::{
    dispatch::EndpointFactory,
    error::SocketError,
    metrics,
    panic::format_panic,
    session::{CloseReason, SessionHandle},
    transport::ClientContainer,
};

/// Lifecycle of one outbound connection.
///
/// Cloning yields another handle to the same manager.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    uri: Url,
    handler_type: &'static str,
    factory: EndpointFactory,
    config: ClientEndpointConfig,
    container: Arc<dyn ClientContainer>,
    auto_start: bool,
    runtime: Handle,
    state: Mutex<Lifecycle>,
}

#[derive(Default)]
struct Lifecycle {
    running: bool,
    phase: ConnectionState,
    session: Option<SessionHandle>,
    worker: Option<TaskTracker>,
    retired: Vec<TaskTracker>,
    epoch: u64,
}

impl ConnectionManager {
    /// Start building a manager connecting to `uri` through `container`.
    pub fn builder(uri: impl Into<String>, container: Arc<dyn ClientContainer>) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new(uri.into(), container)
    }

    pub(crate) fn assemble(
        uri: Url,
        handler_type: &'static str,
        factory: EndpointFactory,
        config: ClientEndpointConfig,
        container: Arc<dyn ClientContainer>,
        auto_start: bool,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                uri,
                handler_type,
                factory,
                config,
                container,
                auto_start,
                runtime,
                state: Mutex::new(Lifecycle::default()),
            }),
        }
    }

    /// Target address.
    #[must_use]
    pub fn uri(&self) -> &Url { &self.inner.uri }

    /// Type name of the handler.
    #[must_use]
    pub fn handler_type(&self) -> &'static str { self.inner.handler_type }

    /// Settings passed to the container on each connect.
    #[must_use]
    pub fn config(&self) -> &ClientEndpointConfig { &self.inner.config }

    /// Container used to open connections.
    #[must_use]
    pub fn container(&self) -> &Arc<dyn ClientContainer> { &self.inner.container }

    /// Whether the registry starts this manager when it becomes ready.
    #[must_use]
    pub fn auto_start(&self) -> bool { self.inner.auto_start }

    /// Whether a connection is wanted, including while the first connect
    /// attempt is still in flight.
    #[must_use]
    pub fn is_running(&self) -> bool { self.lock().running }

    /// Current lifecycle phase.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.lock().phase }

    /// Whether a session is published and still open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        let state = self.lock();
        state.phase == ConnectionState::Connected && state.session.as_ref().is_some_and(|s| s.is_open())
    }

    /// The published session, if connected.
    #[must_use]
    pub fn session(&self) -> Option<SessionHandle> { self.lock().session.clone() }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin connecting in the background. Does nothing if already running.
    pub fn start(&self) {
        let mut state = self.lock();
        if state.running {
            debug!("client connection already running: uri={}", self.inner.uri);
            return;
        }
        state.running = true;
        state.phase = ConnectionState::Starting;
        state.epoch = state.epoch.wrapping_add(1);
        let epoch = state.epoch;
        let worker = state.worker.get_or_insert_with(TaskTracker::new);
        info!("starting client connection: uri={}", self.inner.uri);

        let manager = self.clone();
        let span = tracing::info_span!("client_connect", uri = %self.inner.uri, epoch);
        worker.spawn_on(manager.connect(epoch).instrument(span), &self.inner.runtime);
    }

    /// Close the session and retire the worker. Does nothing if not running.
    pub fn stop(&self) { self.stop_with(|| {}); }

    /// Like [`stop`](Self::stop), then run `callback` while still holding the
    /// manager's lock. The callback always runs, even if the manager was not
    /// running, and must not call back into this manager.
    pub fn stop_with<F: FnOnce()>(&self, callback: F) {
        let mut state = self.lock();
        if state.running {
            info!("stopping client connection: uri={}", self.inner.uri);
            self.teardown(&mut state);
        }
        callback();
    }

    /// Wait until no connect attempt is in flight, including attempts left
    /// running by earlier calls to `stop`.
    pub async fn wait_idle(&self) {
        let (current, retired) = {
            let state = self.lock();
            (state.worker.clone(), state.retired.clone())
        };
        for worker in retired {
            worker.wait().await;
        }
        let Some(worker) = current else {
            return;
        };
        worker.close();
        worker.wait().await;
        let state = self.lock();
        if state.worker.as_ref().is_some_and(|w| TaskTracker::ptr_eq(w, &worker)) {
            worker.reopen();
        }
    }

    fn teardown(&self, state: &mut Lifecycle) {
        state.phase = ConnectionState::Stopping;
        if let Some(session) = state.session.take() {
            metrics::dec_client_connections();
            close_session(&self.inner.uri, &session, CloseReason::normal());
        }
        state.running = false;
        state.phase = ConnectionState::Stopped;
        if let Some(worker) = state.worker.take() {
            worker.close();
            state.retired.retain(|w| !w.is_empty());
            state.retired.push(worker);
        }
    }

    async fn connect(self, epoch: u64) {
        info!("connecting: uri={}", self.inner.uri);
        match AssertUnwindSafe(self.attempt()).catch_unwind().await {
            Ok(Ok(session)) => self.publish(epoch, session),
            Ok(Err(e)) => self.connect_failed(epoch, &e),
            Err(panic) => {
                let panic_msg = format_panic(&panic);
                self.connect_failed(epoch, &format_args!("connect task panicked: {panic_msg}"));
            }
        }
    }

    async fn attempt(&self) -> Result<SessionHandle, SocketError> {
        let endpoint = (self.inner.factory)()?;
        let session = self
            .inner
            .container
            .connect(endpoint, &self.inner.config, &self.inner.uri)
            .await?;
        Ok(session)
    }

    fn publish(&self, epoch: u64, session: SessionHandle) {
        let uri = &self.inner.uri;
        {
            let mut state = self.lock();
            if state.running && state.epoch == epoch {
                info!("connected: uri={uri}, session={}", session.id());
                state.session = Some(session);
                state.phase = ConnectionState::Connected;
                metrics::inc_client_connections();
                return;
            }
        }
        info!("closing session from superseded connect attempt: uri={uri}, session={}", session.id());
        close_session(uri, &session, CloseReason::normal());
    }

    fn connect_failed(&self, epoch: u64, e: &dyn fmt::Display) {
        metrics::inc_connect_failures();
        error!("failed to connect: uri={}, error={e}", self.inner.uri);
        let mut state = self.lock();
        if state.running && state.epoch == epoch {
            self.teardown(&mut state);
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ConnectionManager")
            .field("uri", &self.inner.uri.as_str())
            .field("handler_type", &self.inner.handler_type)
            .field("auto_start", &self.inner.auto_start)
            .field("running", &state.running)
            .field("phase", &state.phase)
            .finish_non_exhaustive()
    }
}

/// Best-effort close; failures and panics are logged.
fn close_session(uri: &Url, session: &SessionHandle, reason: CloseReason) {
    if !session.is_open() {
        return;
    }
    match catch_unwind(AssertUnwindSafe(|| session.close(reason))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("failed to close session: uri={uri}, session={}, error={e}", session.id()),
        Err(panic) => {
            let panic_msg = format_panic(&panic);
            error!("session close panicked: uri={uri}, session={}, panic={panic_msg}", session.id());
        }
    }
}
