//! Metric helpers for `wsbridge`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. With the `metrics` feature
//! disabled the helpers compile to no-ops.

/// Name of the gauge tracking connected client managers.
pub const CLIENT_CONNECTIONS_ACTIVE: &str = "wsbridge_client_connections_active";
/// Name of the counter tracking failed outbound connection attempts.
pub const CONNECT_FAILURES: &str = "wsbridge_connect_failures_total";
/// Name of the counter tracking handler failures contained by the dispatcher.
pub const HANDLER_ERRORS: &str = "wsbridge_handler_errors_total";
/// Name of the counter tracking endpoints registered with a server container.
pub const ENDPOINTS_REGISTERED: &str = "wsbridge_endpoints_registered_total";

/// Handler callback in which a contained failure occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// The open callback.
    Open,
    /// The close callback.
    Close,
    /// The error callback.
    Error,
    /// A text, binary or pong message callback.
    Message,
}

impl Phase {
    /// Label value recorded for this phase.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Open => "open",
            Phase::Close => "close",
            Phase::Error => "error",
            Phase::Message => "message",
        }
    }
}

/// Increment the connected client gauge.
#[cfg(feature = "metrics")]
pub fn inc_client_connections() { metrics::gauge!(CLIENT_CONNECTIONS_ACTIVE).increment(1.0); }

/// Decrement the connected client gauge.
#[cfg(feature = "metrics")]
pub fn dec_client_connections() { metrics::gauge!(CLIENT_CONNECTIONS_ACTIVE).decrement(1.0); }

/// Record a failed outbound connection attempt.
#[cfg(feature = "metrics")]
pub fn inc_connect_failures() { metrics::counter!(CONNECT_FAILURES).increment(1); }

/// Record a handler failure contained during `phase`.
#[cfg(feature = "metrics")]
pub fn inc_handler_errors(phase: Phase) {
    metrics::counter!(HANDLER_ERRORS, "phase" => phase.as_str()).increment(1);
}

/// Record an endpoint accepted by a server container.
#[cfg(feature = "metrics")]
pub fn inc_endpoints_registered() { metrics::counter!(ENDPOINTS_REGISTERED).increment(1); }

/// Increment the connected client gauge.
#[cfg(not(feature = "metrics"))]
pub fn inc_client_connections() {}

/// Decrement the connected client gauge.
#[cfg(not(feature = "metrics"))]
pub fn dec_client_connections() {}

/// Record a failed outbound connection attempt.
#[cfg(not(feature = "metrics"))]
pub fn inc_connect_failures() {}

/// Record a handler failure contained during `phase`.
#[cfg(not(feature = "metrics"))]
pub fn inc_handler_errors(_phase: Phase) {}

/// Record an endpoint accepted by a server container.
#[cfg(not(feature = "metrics"))]
pub fn inc_endpoints_registered() {}
