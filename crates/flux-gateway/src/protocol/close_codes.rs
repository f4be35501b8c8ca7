//! Gateway close codes
//!
//! The gateway closes with 4000-range codes. A handful of them mean the
//! client is misconfigured and must not reconnect; every other code,
//! including transport-level ones like 1006, is worth another attempt.

use std::fmt;

/// Application close codes sent by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    UnknownError = 4000,
    UnknownOpcode = 4001,
    DecodeError = 4002,
    NotAuthenticated = 4003,
    AuthenticationFailed = 4004,
    AlreadyAuthenticated = 4005,
    InvalidSequence = 4007,
    RateLimited = 4008,
    SessionTimeout = 4009,
    InvalidShard = 4010,
    ShardingRequired = 4011,
    InvalidApiVersion = 4012,
    InvalidCapabilities = 4013,
    DisallowedCapabilities = 4014,
}

impl CloseCode {
    /// Every known code, in numeric order
    pub const ALL: [Self; 14] = [
        Self::UnknownError,
        Self::UnknownOpcode,
        Self::DecodeError,
        Self::NotAuthenticated,
        Self::AuthenticationFailed,
        Self::AlreadyAuthenticated,
        Self::InvalidSequence,
        Self::RateLimited,
        Self::SessionTimeout,
        Self::InvalidShard,
        Self::ShardingRequired,
        Self::InvalidApiVersion,
        Self::InvalidCapabilities,
        Self::DisallowedCapabilities,
    ];

    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|known| known.as_u16() == code)
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Human-readable reason, used when the server sends none
    #[must_use]
    pub const fn description(self) -> &'static str {
        self.meta().0
    }

    /// The session can never succeed with the current configuration
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        self.meta().1
    }

    const fn meta(self) -> (&'static str, bool) {
        match self {
            Self::UnknownError => ("unknown error", false),
            Self::UnknownOpcode => ("unknown op code", false),
            Self::DecodeError => ("payload could not be decoded", false),
            Self::NotAuthenticated => ("payload sent before identifying", false),
            Self::AuthenticationFailed => ("authentication failed", true),
            Self::AlreadyAuthenticated => ("already authenticated", false),
            Self::InvalidSequence => ("invalid resume sequence", false),
            Self::RateLimited => ("sending payloads too quickly", false),
            Self::SessionTimeout => ("session timed out", false),
            Self::InvalidShard => ("invalid shard", true),
            Self::ShardingRequired => ("sharding required", true),
            Self::InvalidApiVersion => ("invalid API version", true),
            Self::InvalidCapabilities => ("invalid capabilities", true),
            Self::DisallowedCapabilities => ("disallowed capabilities", true),
        }
    }
}

/// Whether a raw close code allows another connection attempt
#[must_use]
pub fn is_recoverable(code: u16) -> bool {
    CloseCode::from_u16(code).map_or(true, |known| !known.is_fatal())
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.description())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}
