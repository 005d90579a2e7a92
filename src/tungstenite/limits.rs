//! Container tuning shared by the server and client providers.

use std::{
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
    time::Duration,
};

use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use crate::transport::ContainerTuning;

/// Live tuning values; zero means unset.
#[derive(Debug, Default)]
pub(super) struct Limits {
    send_timeout_ms: AtomicU64,
    idle_timeout_ms: AtomicU64,
    max_text_bytes: AtomicUsize,
    max_binary_bytes: AtomicUsize,
}

impl Limits {
    /// Values in force for a connection opened now.
    pub(super) fn snapshot(&self) -> LimitSnapshot {
        let millis = |value: &AtomicU64| match value.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        let bytes = |value: &AtomicUsize| match value.load(Ordering::Relaxed) {
            0 => None,
            n => Some(n),
        };
        LimitSnapshot {
            send_timeout: millis(&self.send_timeout_ms),
            idle_timeout: millis(&self.idle_timeout_ms),
            max_text: bytes(&self.max_text_bytes),
            max_binary: bytes(&self.max_binary_bytes),
        }
    }
}

fn as_millis(timeout: Duration) -> u64 { u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX) }

impl ContainerTuning for Limits {
    fn set_async_send_timeout(&self, timeout: Duration) {
        self.send_timeout_ms.store(as_millis(timeout), Ordering::Relaxed);
    }

    fn set_max_session_idle_timeout(&self, timeout: Duration) {
        self.idle_timeout_ms.store(as_millis(timeout), Ordering::Relaxed);
    }

    fn set_max_text_message_buffer_size(&self, bytes: usize) {
        self.max_text_bytes.store(bytes, Ordering::Relaxed);
    }

    fn set_max_binary_message_buffer_size(&self, bytes: usize) {
        self.max_binary_bytes.store(bytes, Ordering::Relaxed);
    }
}

/// Tuning captured when a connection opens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(super) struct LimitSnapshot {
    pub(super) send_timeout: Option<Duration>,
    pub(super) idle_timeout: Option<Duration>,
    pub(super) max_text: Option<usize>,
    pub(super) max_binary: Option<usize>,
}

impl LimitSnapshot {
    /// Tungstenite enforces a single message limit; use the larger of the
    /// two so the per-type checks in the driver decide.
    pub(super) fn ws_config(&self) -> WebSocketConfig {
        let max = match (self.max_text, self.max_binary) {
            (Some(text), Some(binary)) => Some(text.max(binary)),
            (text, binary) => text.or(binary),
        };
        let config = WebSocketConfig::default();
        match max {
            Some(limit) => config.max_message_size(Some(limit)),
            None => config,
        }
    }

    pub(super) fn text_too_big(&self, len: usize) -> bool { self.max_text.is_some_and(|max| len > max) }

    pub(super) fn binary_too_big(&self, len: usize) -> bool { self.max_binary.is_some_and(|max| len > max) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_stay_unset() {
        let limits = Limits::default();
        limits.set_max_text_message_buffer_size(0);
        assert_eq!(limits.snapshot(), LimitSnapshot::default());
    }

    #[test]
    fn per_type_limits_are_checked_separately() {
        let limits = Limits::default();
        limits.set_max_text_message_buffer_size(4);
        limits.set_max_session_idle_timeout(Duration::from_millis(250));
        let snapshot = limits.snapshot();
        assert!(snapshot.text_too_big(5));
        assert!(!snapshot.binary_too_big(5));
        assert_eq!(snapshot.idle_timeout, Some(Duration::from_millis(250)));
    }
}
