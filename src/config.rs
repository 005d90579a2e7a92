//! Module configuration.
//!
//! [`SocketConfig`] carries the switches and container-wide limits the
//! [`crate::Registry`] applies when the transport container becomes ready.
//! Loading values from files or the environment is left to the embedding
//! application; the type deserialises with `serde` and every field is
//! optional.

use std::time::Duration;

use serde::Deserialize;

use crate::transport::ContainerTuning;

/// Configuration for the socket module.
///
/// Zero means "use the provider default" for every limit.
///
/// ```
/// use wsbridge::SocketConfig;
///
/// let config = SocketConfig::default()
///     .async_send_timeout_ms(5_000)
///     .max_text_message_buffer_bytes(64 * 1024);
/// assert!(config.enabled);
/// assert_eq!(config.max_session_idle_timeout_ms, 0);
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SocketConfig {
    /// Whether endpoints are registered and clients started at all.
    pub enabled: bool,
    /// Asynchronous send timeout in milliseconds.
    pub async_send_timeout_ms: u64,
    /// Default session idle timeout in milliseconds.
    pub max_session_idle_timeout_ms: u64,
    /// Default maximum text message buffer in bytes.
    pub max_text_message_buffer_bytes: usize,
    /// Default maximum binary message buffer in bytes.
    pub max_binary_message_buffer_bytes: usize,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            async_send_timeout_ms: 0,
            max_session_idle_timeout_ms: 0,
            max_text_message_buffer_bytes: 0,
            max_binary_message_buffer_bytes: 0,
        }
    }
}

impl SocketConfig {
    /// Enable or disable the module.
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the asynchronous send timeout.
    #[must_use]
    pub fn async_send_timeout_ms(mut self, millis: u64) -> Self {
        self.async_send_timeout_ms = millis;
        self
    }

    /// Set the default session idle timeout.
    #[must_use]
    pub fn max_session_idle_timeout_ms(mut self, millis: u64) -> Self {
        self.max_session_idle_timeout_ms = millis;
        self
    }

    /// Set the default maximum text message buffer.
    #[must_use]
    pub fn max_text_message_buffer_bytes(mut self, bytes: usize) -> Self {
        self.max_text_message_buffer_bytes = bytes;
        self
    }

    /// Set the default maximum binary message buffer.
    #[must_use]
    pub fn max_binary_message_buffer_bytes(mut self, bytes: usize) -> Self {
        self.max_binary_message_buffer_bytes = bytes;
        self
    }

    /// Push every configured (non-zero) limit into `container`.
    pub fn apply_tuning<C: ContainerTuning + ?Sized>(&self, container: &C) {
        if self.async_send_timeout_ms > 0 {
            container.set_async_send_timeout(Duration::from_millis(self.async_send_timeout_ms));
        }
        if self.max_session_idle_timeout_ms > 0 {
            container.set_max_session_idle_timeout(Duration::from_millis(
                self.max_session_idle_timeout_ms,
            ));
        }
        if self.max_text_message_buffer_bytes > 0 {
            container.set_max_text_message_buffer_size(self.max_text_message_buffer_bytes);
        }
        if self.max_binary_message_buffer_bytes > 0 {
            container.set_max_binary_message_buffer_size(self.max_binary_message_buffer_bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingTuning(Mutex<Vec<String>>);

    impl RecordingTuning {
        fn calls(&self) -> Vec<String> { self.0.lock().expect("calls lock").clone() }
        fn push(&self, call: String) { self.0.lock().expect("calls lock").push(call); }
    }

    impl ContainerTuning for RecordingTuning {
        fn set_async_send_timeout(&self, timeout: Duration) {
            self.push(format!("send={}", timeout.as_millis()));
        }
        fn set_max_session_idle_timeout(&self, timeout: Duration) {
            self.push(format!("idle={}", timeout.as_millis()));
        }
        fn set_max_text_message_buffer_size(&self, bytes: usize) { self.push(format!("text={bytes}")); }
        fn set_max_binary_message_buffer_size(&self, bytes: usize) {
            self.push(format!("binary={bytes}"));
        }
    }

    #[test]
    fn defaults_leave_provider_untouched() {
        let tuning = RecordingTuning::default();
        SocketConfig::default().apply_tuning(&tuning);
        assert!(tuning.calls().is_empty());
    }

    #[test]
    fn only_positive_values_are_applied() {
        let tuning = RecordingTuning::default();
        SocketConfig::default()
            .async_send_timeout_ms(250)
            .max_binary_message_buffer_bytes(1024)
            .apply_tuning(&tuning);
        assert_eq!(tuning.calls(), vec!["send=250", "binary=1024"]);
    }

    #[test]
    fn missing_fields_take_defaults_when_deserialised() {
        let config: SocketConfig = serde::Deserialize::deserialize(
            serde::de::value::MapDeserializer::<_, serde::de::value::Error>::new(
                [("max_session_idle_timeout_ms", 30_000u64)].into_iter(),
            ),
        )
        .expect("config deserialises");
        assert!(config.enabled);
        assert_eq!(config.max_session_idle_timeout_ms, 30_000);
        assert_eq!(config.async_send_timeout_ms, 0);
    }
}
