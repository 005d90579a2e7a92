//! Test doubles for exercising [`wsbridge`] without a network.
//!
//! [`MemoryContainer`] stands in for both the server and client container,
//! [`MemorySession`] records traffic and [`RecordingHandler`] records every
//! callback the dispatcher makes.
//!
//! ```rust
//! use wsbridge::{EndpointRegistration, handler::shared};
//! use wsbridge_testing::{Event, MemoryContainer, RecordingHandler};
//!
//! let container = MemoryContainer::new();
//! let registration = EndpointRegistration::builder("/chat")
//!     .handler(shared(RecordingHandler::new()))
//!     .unwrap();
//! # let _ = (container, registration, Event::Open);
//! ```

pub mod container;
pub mod handler;
pub mod logging;
pub mod session;

use std::{future::Future, time::Duration};

pub use container::{MemoryConnection, MemoryContainer};
pub use handler::{Event, Fault, RecordingHandler};
pub use logging::{LoggerHandle, logger};
pub use session::MemorySession;

/// Poll `condition` every few milliseconds until it holds or `timeout`
/// elapses. Returns the final value of `condition`.
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Run `future` with a bounded wait, panicking with `what` on timeout.
///
/// # Panics
///
/// Panics if `future` does not complete within `timeout`.
pub async fn within<F: Future>(timeout: Duration, what: &str, future: F) -> F::Output {
    match tokio::time::timeout(timeout, future).await {
        Ok(output) => output,
        Err(_) => panic!("timed out waiting for {what}"),
    }
}
