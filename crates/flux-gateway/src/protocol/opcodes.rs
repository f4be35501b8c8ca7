//! Gateway op codes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Selects how the rest of a frame is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum OpCode {
    Dispatch = 0,
    /// Client heartbeat, or a server request for one
    Heartbeat = 1,
    Identify = 2,
    PresenceUpdate = 3,
    VoiceStateUpdate = 4,
    VoiceServerPing = 5,
    Resume = 6,
    /// Server asks the client to reconnect and resume
    Reconnect = 7,
    RequestGuildMembers = 8,
    /// The session cannot be resumed
    InvalidSession = 9,
    /// First frame on every connection, carries the heartbeat interval
    Hello = 10,
    HeartbeatAck = 11,
    CallConnect = 13,
    GuildSubscriptions = 14,
}

impl OpCode {
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// The client may send this op
    #[must_use]
    pub const fn is_client_op(self) -> bool {
        !matches!(
            self,
            Self::Dispatch
                | Self::Reconnect
                | Self::InvalidSession
                | Self::Hello
                | Self::HeartbeatAck
        )
    }

    /// The server may send this op
    #[must_use]
    pub const fn is_server_op(self) -> bool {
        matches!(
            self,
            Self::Dispatch
                | Self::Heartbeat
                | Self::Reconnect
                | Self::InvalidSession
                | Self::Hello
                | Self::HeartbeatAck
        )
    }
}

/// Raw value outside the op code table
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown op code {0}")]
pub struct UnknownOpCode(pub u8);

impl TryFrom<u8> for OpCode {
    type Error = UnknownOpCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let op = match value {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            3 => Self::PresenceUpdate,
            4 => Self::VoiceStateUpdate,
            5 => Self::VoiceServerPing,
            6 => Self::Resume,
            7 => Self::Reconnect,
            8 => Self::RequestGuildMembers,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            13 => Self::CallConnect,
            14 => Self::GuildSubscriptions,
            other => return Err(UnknownOpCode(other)),
        };
        Ok(op)
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op.as_u8()
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}({})", self.as_u8())
    }
}
