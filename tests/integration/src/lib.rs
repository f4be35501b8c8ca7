//! Integration test utilities
//!
//! In-process axum servers standing in for the REST API and the gateway.

pub mod helpers;

pub use helpers::*;
