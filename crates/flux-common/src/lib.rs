//! # flux-common
//!
//! Shared utilities including configuration, credentials, and telemetry.

pub mod auth;
pub mod config;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use auth::{Credential, CredentialError};
pub use config::{
    ApiConfig, ClientConfig, ConfigError, GatewayConfig, RateLimitConfig, ReconnectConfig,
};
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_tracing, try_init_tracing_with_config,
    TracingConfig, TracingError,
};
