//! Bootstrap coordination of endpoint registrations and client managers.
//!
//! The application builds a [`Registry`], registers server endpoints and
//! client managers, then calls [`Registry::on_container_ready`] once the
//! transport container exists and [`Registry::teardown`] on shutdown.

use std::{
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use log::{error, info};
use url::Url;

use crate::{
    client::ConnectionManager,
    config::SocketConfig,
    error::ConfigError,
    metrics,
    panic::format_panic,
    server::EndpointRegistration,
    transport::ServerContainer,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Building,
    Ready,
    TornDown,
}

/// Owns every registration and manager for one application.
pub struct Registry {
    config: SocketConfig,
    registrations: Vec<Arc<EndpointRegistration>>,
    managers: Vec<ConnectionManager>,
    server: Option<Arc<dyn ServerContainer>>,
    stage: Stage,
}

impl Registry {
    /// Empty registry using `config`.
    #[must_use]
    pub fn new(config: SocketConfig) -> Self {
        Self {
            config,
            registrations: Vec::new(),
            managers: Vec::new(),
            server: None,
            stage: Stage::Building,
        }
    }

    /// Module configuration.
    #[must_use]
    pub fn config(&self) -> &SocketConfig { &self.config }

    /// Whether [`on_container_ready`](Self::on_container_ready) has completed.
    #[must_use]
    pub fn is_ready(&self) -> bool { self.stage == Stage::Ready }

    /// Registered server endpoints, in registration order.
    #[must_use]
    pub fn registrations(&self) -> &[Arc<EndpointRegistration>] { &self.registrations }

    /// Registered client managers, in registration order.
    #[must_use]
    pub fn managers(&self) -> &[ConnectionManager] { &self.managers }

    /// The manager connecting to `uri`, if any.
    #[must_use]
    pub fn manager(&self, uri: &str) -> Option<&ConnectionManager> {
        let wanted = Url::parse(uri).ok();
        self.managers.iter().find(|m| match &wanted {
            Some(url) => m.uri() == url,
            None => m.uri().as_str() == uri,
        })
    }

    /// Add a server endpoint.
    ///
    /// A registration added after the container is ready is deployed at once.
    /// After teardown the registration is dropped with a log line.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicatePath`] if another registration already
    /// claimed the path; the earlier registration is kept.
    pub fn register_server(&mut self, registration: EndpointRegistration) -> Result<(), ConfigError> {
        let path = registration.path();
        if self.stage == Stage::TornDown {
            info!("registry torn down; endpoint ignored: path={path}");
            return Ok(());
        }
        if self.registrations.iter().any(|r| r.path() == path) {
            error!(
                "duplicate endpoint path rejected: path={path}, handler={}",
                registration.handler_type()
            );
            return Err(ConfigError::DuplicatePath(path.to_owned()));
        }
        let mut registration = Arc::new(registration);
        if let (Stage::Ready, Some(server)) = (self.stage, &self.server) {
            deploy(server.as_ref(), &mut registration);
        }
        self.registrations.push(registration);
        Ok(())
    }

    /// Add a client manager.
    ///
    /// An auto-start manager added after the container is ready starts at
    /// once. After teardown the manager is dropped with a log line.
    pub fn register_client(&mut self, manager: ConnectionManager) {
        if self.stage == Stage::TornDown {
            info!("registry torn down; client ignored: uri={}", manager.uri());
            return;
        }
        if self.stage == Stage::Ready && manager.auto_start() && !manager.is_running() {
            manager.start();
        }
        self.managers.push(manager);
    }

    /// Tune the containers, deploy every endpoint and start auto-start
    /// managers.
    ///
    /// Skipped when the module is disabled, already ready, or torn down.
    /// Deployment failures are logged per endpoint and do not stop the rest.
    pub fn on_container_ready(&mut self, server: Arc<dyn ServerContainer>) {
        if !self.config.enabled {
            info!("websocket support disabled; container setup skipped");
            return;
        }
        if self.stage != Stage::Building {
            info!("container setup already handled: stage={:?}", self.stage);
            return;
        }

        // One container may serve both roles; tune each allocation once.
        self.config.apply_tuning(server.as_ref());
        let mut tuned = vec![Arc::as_ptr(&server).cast::<()>()];
        for manager in &self.managers {
            let container = manager.container();
            let ptr = Arc::as_ptr(container).cast::<()>();
            if !tuned.contains(&ptr) {
                self.config.apply_tuning(container.as_ref());
                tuned.push(ptr);
            }
        }

        for registration in &mut self.registrations {
            deploy(server.as_ref(), registration);
        }

        for manager in &self.managers {
            if manager.auto_start() && !manager.is_running() {
                manager.start();
            }
        }

        info!(
            "container ready: endpoints={}, clients={}",
            self.registrations.len(),
            self.managers.len()
        );
        self.server = Some(server);
        self.stage = Stage::Ready;
    }

    /// Stop every manager and release all registrations.
    ///
    /// Idempotent, and safe to call before the container is ready. A manager
    /// whose stop panics is logged and skipped.
    pub fn teardown(&mut self) {
        if self.stage == Stage::TornDown {
            return;
        }
        for manager in self.managers.drain(..) {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| manager.stop())) {
                let panic_msg = format_panic(&panic);
                error!("client manager stop panicked: uri={}, panic={panic_msg}", manager.uri());
            }
        }
        self.registrations.clear();
        self.server = None;
        self.stage = Stage::TornDown;
        info!("websocket registry torn down");
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("registrations", &self.registrations)
            .field("managers", &self.managers)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

fn deploy(server: &dyn ServerContainer, registration: &mut Arc<EndpointRegistration>) {
    if let Some(unshared) = Arc::get_mut(registration) {
        unshared.freeze();
    }
    let path = registration.path().to_owned();
    match server.add_endpoint(Arc::clone(registration)) {
        Ok(()) => {
            metrics::inc_endpoints_registered();
            info!("endpoint registered: path={path}, handler={}", registration.handler_type());
        }
        Err(e) => error!("endpoint deployment failed: path={path}, error={e}"),
    }
}
