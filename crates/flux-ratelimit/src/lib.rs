//! # flux-ratelimit
//!
//! Client-side admission control for REST routes.
//!
//! Each logical route maps to a [`RateLimitRule`]; a rule's bucket template is
//! resolved with the caller's IDs into a concrete key, and every concrete key
//! gets its own sliding-window [`RateLimitBucket`].

mod bucket;
mod limiter;
mod registry;

pub use bucket::RateLimitBucket;
pub use limiter::RateLimiter;
pub use registry::{RateLimitRegistry, RateLimitRule, ResolvedBucket, RouteParams};
