//! Shared utilities for integration tests.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{sync::Arc, time::Duration};

use wsbridge::{ConnectionManager, EndpointRegistration, handler::SharedInstance};
use wsbridge_testing::{MemoryContainer, RecordingHandler};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Upper bound for anything the lifecycle does in the background.
pub const SETTLE: Duration = Duration::from_secs(2);

/// Registration at `path` whose handler is shared and returned for
/// inspection.
pub fn recorded_endpoint(path: &str) -> TestResult<(EndpointRegistration, Arc<RecordingHandler>)> {
    let handler = Arc::new(RecordingHandler::new());
    let registration =
        EndpointRegistration::builder(path).handler(SharedInstance::from_arc(Arc::clone(&handler)))?;
    Ok((registration, handler))
}

/// Manager for `uri` backed by `container`, with its handler returned for
/// inspection.
pub fn recorded_manager(
    uri: &str,
    container: &Arc<MemoryContainer>,
    auto_start: bool,
) -> TestResult<(ConnectionManager, Arc<RecordingHandler>)> {
    let handler = Arc::new(RecordingHandler::new());
    let manager = ConnectionManager::builder(uri, container.clone())
        .auto_start(auto_start)
        .handler(SharedInstance::from_arc(Arc::clone(&handler)))?;
    Ok((manager, handler))
}
