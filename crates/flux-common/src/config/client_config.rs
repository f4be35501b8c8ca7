//! Client configuration structs
//!
//! Loads configuration from environment variables, or builds it in code.

use crate::auth::{Credential, CredentialError};
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credential: Credential,
    pub api: ApiConfig,
    pub gateway: GatewayConfig,
    pub rate_limit: RateLimitConfig,
}

/// REST API settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_url")]
    pub base_url: String,
    #[serde(default = "default_api_timeout_secs")]
    pub timeout_secs: u64,
}

impl ApiConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            timeout_secs: default_api_timeout_secs(),
        }
    }
}

/// Gateway connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub url: String,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// Dispatch event names that are decoded but never delivered
    #[serde(default)]
    pub ignored_events: Vec<String>,
}

impl GatewayConfig {
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[must_use]
    pub fn with_ignored_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_events = events.into_iter().map(Into::into).collect();
        self
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            reconnect: ReconnectConfig::default(),
            ignored_events: Vec::new(),
        }
    }
}

/// Reconnect backoff settings
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_base_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub factor: f64,
    #[serde(default)]
    pub jitter: f64,
    /// `None` retries forever
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl ReconnectConfig {
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    #[must_use]
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_reconnect_base_ms(),
            max_delay_ms: default_reconnect_max_ms(),
            factor: default_backoff_factor(),
            jitter: 0.0,
            max_attempts: None,
        }
    }
}

/// Client-side rate limiting settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_global_limit")]
    pub global_limit: u32,
    #[serde(default = "default_global_window_ms")]
    pub global_window_ms: u64,
}

impl RateLimitConfig {
    #[must_use]
    pub fn global_window(&self) -> Duration {
        Duration::from_millis(self.global_window_ms)
    }

    /// Configuration that admits everything
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_limit: default_global_limit(),
            global_window_ms: default_global_window_ms(),
        }
    }
}

// Default value functions
fn default_api_url() -> String {
    "https://api.fluxer.app/v1".to_string()
}

fn default_api_timeout_secs() -> u64 {
    15
}

fn default_gateway_url() -> String {
    "wss://gateway.fluxer.app/?v=1&encoding=json".to_string()
}

fn default_reconnect_base_ms() -> u64 {
    1000
}

fn default_reconnect_max_ms() -> u64 {
    60_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_global_limit() -> u32 {
    50
}

fn default_global_window_ms() -> u64 {
    1000
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name, value)),
        Err(_) => Ok(None),
    }
}

impl ClientConfig {
    /// Build a configuration with defaults for everything but the credential
    #[must_use]
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            api: ApiConfig::default(),
            gateway: GatewayConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `FLUX_TOKEN` is missing or a variable fails to parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let token = env::var("FLUX_TOKEN").map_err(|_| ConfigError::MissingVar("FLUX_TOKEN"))?;
        let credential = Credential::parse(&token)?;

        let reconnect_defaults = ReconnectConfig::default();
        let rate_defaults = RateLimitConfig::default();

        Ok(Self {
            credential,
            api: ApiConfig {
                base_url: env::var("FLUX_API_URL").unwrap_or_else(|_| default_api_url()),
                timeout_secs: parse_var("FLUX_API_TIMEOUT_SECS")?
                    .unwrap_or_else(default_api_timeout_secs),
            },
            gateway: GatewayConfig {
                url: env::var("FLUX_GATEWAY_URL").unwrap_or_else(|_| default_gateway_url()),
                reconnect: ReconnectConfig {
                    base_delay_ms: parse_var("FLUX_RECONNECT_BASE_MS")?
                        .unwrap_or(reconnect_defaults.base_delay_ms),
                    max_delay_ms: parse_var("FLUX_RECONNECT_MAX_MS")?
                        .unwrap_or(reconnect_defaults.max_delay_ms),
                    max_attempts: parse_var("FLUX_RECONNECT_MAX_ATTEMPTS")?,
                    ..reconnect_defaults
                },
                ignored_events: env::var("FLUX_IGNORED_EVENTS")
                    .ok()
                    .map(|s| {
                        s.split(',')
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(str::to_uppercase)
                            .collect()
                    })
                    .unwrap_or_default(),
            },
            rate_limit: RateLimitConfig {
                enabled: parse_var("FLUX_RATE_LIMIT_ENABLED")?.unwrap_or(rate_defaults.enabled),
                global_limit: parse_var("FLUX_RATE_LIMIT_GLOBAL")?
                    .unwrap_or(rate_defaults.global_limit),
                global_window_ms: parse_var("FLUX_RATE_LIMIT_GLOBAL_WINDOW_MS")?
                    .unwrap_or(rate_defaults.global_window_ms),
            },
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid credential: {0}")]
    Credential(#[from] CredentialError),
}
