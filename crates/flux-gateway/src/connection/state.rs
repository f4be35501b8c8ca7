//! Connection state

use std::fmt;

/// Session manager states
///
/// `Established` is the only state in which dispatch frames reach listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Created, not yet asked to connect
    #[default]
    Idle,
    /// Opening the transport
    Connecting,
    /// Transport open, waiting for Hello
    AwaitingHello,
    /// Identify sent, waiting for READY
    Identifying,
    /// Resume sent, waiting for replayed dispatches or RESUMED
    Resuming,
    /// Handshake complete, dispatches are delivered
    Established,
    /// Waiting out the backoff before the next attempt
    Reconnecting,
    /// Shut down or failed for good
    Terminated,
}

impl ConnectionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::AwaitingHello => "awaiting_hello",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Established => "established",
            Self::Reconnecting => "reconnecting",
            Self::Terminated => "terminated",
        }
    }

    /// Check if a handshake is in flight
    #[must_use]
    pub const fn is_handshaking(self) -> bool {
        matches!(self, Self::AwaitingHello | Self::Identifying | Self::Resuming)
    }

    /// Check if no further transitions will happen
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
