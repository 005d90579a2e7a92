//! Connection manager lifecycle phases.

use std::fmt;

/// Phase of a [`super::ConnectionManager`].
///
/// `Stopped` → `Starting` → `Connected` → `Stopping` → `Stopped`; a failed
/// connect attempt folds `Starting` straight back into `Stopped`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not running.
    #[default]
    Stopped,
    /// A connect attempt is in flight.
    Starting,
    /// A session is published.
    Connected,
    /// Teardown in progress.
    Stopping,
}

impl ConnectionState {
    /// Lower-case name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Connected => "connected",
            Self::Stopping => "stopping",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}
