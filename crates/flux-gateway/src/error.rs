//! Gateway error types

use std::time::Duration;

use thiserror::Error;

use crate::protocol::CodecError;

/// Socket-level failures
///
/// Always recoverable through the reconnect policy.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("connection closed")]
    Closed,
}

/// Errors surfaced by the gateway client
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("payload encoding failed: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("gateway closed the connection with non-recoverable code {code}: {reason}")]
    FatalClose { code: u16, reason: String },

    #[error("gave up reconnecting after {attempts} attempts")]
    AttemptsExhausted { attempts: u32 },

    #[error("gateway actor is no longer running")]
    ActorClosed,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GatewayError {
    /// Check if this error ends the session for good
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::FatalClose { .. } | Self::AttemptsExhausted { .. } | Self::InvalidConfig(_)
        )
    }

    /// Close code carried by a fatal close
    #[must_use]
    pub const fn close_code(&self) -> Option<u16> {
        match self {
            Self::FatalClose { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Errors from [`EventDispatcher::wait_for`](crate::events::EventDispatcher::wait_for)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("no matching event within {0:?}")]
    Timeout(Duration),

    #[error("wait was cancelled")]
    Cancelled,
}
