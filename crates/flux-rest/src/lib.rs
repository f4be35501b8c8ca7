//! # flux-rest
//!
//! REST side of the client: a [`RestClient`] that admits every call through
//! the shared [`flux_ratelimit::RateLimiter`], the [`Route`] table, typed
//! [`RestError`]s and a validated [`Embed`] builder.

pub mod client;
pub mod embed;
pub mod error;
pub mod route;

pub use client::RestClient;
pub use embed::{Embed, EmbedBuilder, EmbedError, EmbedField};
pub use error::RestError;
pub use route::Route;

pub use reqwest::Method;
