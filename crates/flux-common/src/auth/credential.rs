//! Bot and user credentials
//!
//! REST calls send the credential exactly as configured (`Bot <token>` or
//! `flx_...`); the gateway handshake only ever sees the raw token value.

use std::fmt;

/// Prefix carried by bot credentials on the REST `Authorization` header
pub const BOT_PREFIX: &str = "Bot ";

/// Prefix of user credentials
pub const USER_PREFIX: &str = "flx_";

/// An API credential
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Bot token, stored without the `Bot ` prefix
    Bot(String),
    /// User token, stored verbatim (including `flx_`)
    User(String),
}

impl Credential {
    /// Parse a configured credential string.
    ///
    /// Bare tokens without either prefix are treated as bot tokens.
    pub fn parse(raw: &str) -> Result<Self, CredentialError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CredentialError::Empty);
        }

        if let Some(token) = raw.strip_prefix(BOT_PREFIX) {
            let token = token.trim();
            if token.is_empty() {
                return Err(CredentialError::MissingToken);
            }
            return Ok(Self::Bot(token.to_string()));
        }

        if raw.starts_with(USER_PREFIX) {
            if raw.len() == USER_PREFIX.len() {
                return Err(CredentialError::MissingToken);
            }
            return Ok(Self::User(raw.to_string()));
        }

        if raw.contains(char::is_whitespace) {
            return Err(CredentialError::Malformed);
        }

        Ok(Self::Bot(raw.to_string()))
    }

    /// Value for the REST `Authorization` header
    #[must_use]
    pub fn rest_header(&self) -> String {
        match self {
            Self::Bot(token) => format!("{BOT_PREFIX}{token}"),
            Self::User(token) => token.clone(),
        }
    }

    /// Raw token value sent in the gateway Identify/Resume payloads
    #[must_use]
    pub fn gateway_token(&self) -> &str {
        match self {
            Self::Bot(token) | Self::User(token) => token,
        }
    }

    /// Check if this is a bot credential
    #[must_use]
    pub const fn is_bot(&self) -> bool {
        matches!(self, Self::Bot(_))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the token itself.
        match self {
            Self::Bot(_) => f.write_str("Credential::Bot(..)"),
            Self::User(_) => f.write_str("Credential::User(..)"),
        }
    }
}

impl std::str::FromStr for Credential {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Credential parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("Credential is empty")]
    Empty,

    #[error("Credential prefix present but token is missing")]
    MissingToken,

    #[error("Credential contains whitespace")]
    Malformed,
}
