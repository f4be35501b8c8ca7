//! Rate limiter manager
//!
//! Owns every live bucket and applies the bounded wait-and-retry policy.

use crate::bucket::RateLimitBucket;
use crate::registry::{RateLimitRegistry, ResolvedBucket, RouteParams};
use dashmap::DashMap;
use flux_common::RateLimitConfig;
use std::sync::Arc;
use std::time::Duration;

/// Bucket key used for the global limit
const GLOBAL_BUCKET: &str = "global";

/// Per-route rate limiter
///
/// Buckets are created on first use of a resolved key and live until
/// [`RateLimiter::prune_idle`] or [`RateLimiter::reset_all`] removes them.
#[derive(Debug)]
pub struct RateLimiter {
    registry: RateLimitRegistry,
    buckets: DashMap<String, Arc<RateLimitBucket>>,
    global: Option<Arc<RateLimitBucket>>,
    enabled: bool,
}

impl RateLimiter {
    /// Create a limiter over the given rules
    pub fn new(registry: RateLimitRegistry, config: RateLimitConfig) -> Self {
        let global = (config.enabled && config.global_limit > 0).then(|| {
            Arc::new(RateLimitBucket::new(
                GLOBAL_BUCKET,
                config.global_limit,
                config.global_window(),
            ))
        });

        Self {
            registry,
            buckets: DashMap::new(),
            global,
            enabled: config.enabled,
        }
    }

    /// Create a limiter over the standard route table
    pub fn with_defaults(config: RateLimitConfig) -> Self {
        Self::new(RateLimitRegistry::with_defaults(), config)
    }

    /// Rules this limiter enforces
    pub fn registry(&self) -> &RateLimitRegistry {
        &self.registry
    }

    /// Wait until the call is admitted.
    ///
    /// Each bucket gets at most one extra wait-and-retry: if the retry is still
    /// rejected the limiter sleeps once more and lets the call through, leaving
    /// persistent rejection to the server. Returns the total time spent waiting.
    pub async fn acquire(&self, route: &str, params: &RouteParams) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }

        let Some(resolved) = self.registry.resolve(route, params) else {
            tracing::debug!(route = %route, "No rate limit rule for route");
            return Duration::ZERO;
        };

        let mut waited = Duration::ZERO;

        if !resolved.rule.exempt_from_global {
            if let Some(global) = &self.global {
                waited += admit(global).await;
            }
        }

        waited += self.admit_route(&resolved, self.bucket(&resolved)).await;

        if !waited.is_zero() {
            tracing::debug!(
                route = %route,
                bucket = %resolved.key,
                waited_ms = waited.as_millis(),
                "Request delayed by rate limit"
            );
        }

        waited
    }

    /// Wait the next `acquire` would need, without taking a slot
    pub fn check(&self, route: &str, params: &RouteParams) -> Duration {
        if !self.enabled {
            return Duration::ZERO;
        }
        let Some(resolved) = self.registry.resolve(route, params) else {
            return Duration::ZERO;
        };

        let route_wait = self
            .buckets
            .get(&resolved.key)
            .map_or(Duration::ZERO, |bucket| bucket.peek_wait());

        let global_wait = match &self.global {
            Some(global) if !resolved.rule.exempt_from_global => global.peek_wait(),
            _ => Duration::ZERO,
        };

        route_wait.max(global_wait)
    }

    /// Free slots for the resolved bucket, `None` for unknown routes
    pub fn remaining(&self, route: &str, params: &RouteParams) -> Option<u32> {
        let resolved = self.registry.resolve(route, params)?;
        Some(
            self.buckets
                .get(&resolved.key)
                .map_or(resolved.rule.limit, |bucket| bucket.remaining()),
        )
    }

    /// Time until the resolved bucket frees its oldest slot, `None` for unknown routes
    pub fn reset_time(&self, route: &str, params: &RouteParams) -> Option<Duration> {
        let resolved = self.registry.resolve(route, params)?;
        Some(
            self.buckets
                .get(&resolved.key)
                .map_or(Duration::ZERO, |bucket| bucket.reset_time()),
        )
    }

    /// Clear the resolved bucket. Returns false if it never existed.
    pub fn reset(&self, route: &str, params: &RouteParams) -> bool {
        let Some(resolved) = self.registry.resolve(route, params) else {
            return false;
        };
        match self.buckets.get(&resolved.key) {
            Some(bucket) => {
                bucket.reset();
                true
            }
            None => false,
        }
    }

    /// Drop every bucket and clear the global window
    pub fn reset_all(&self) {
        self.buckets.clear();
        if let Some(global) = &self.global {
            global.reset();
        }
    }

    /// Number of live route buckets
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Evict buckets with an empty window that were unused for `max_idle`.
    ///
    /// Returns the number of evicted buckets.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| !bucket.is_idle(max_idle));
        let evicted = before.saturating_sub(self.buckets.len());

        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.buckets.len(), "Pruned idle buckets");
        }
        evicted
    }

    /// Admit on a route bucket, moving to the live bucket if `bucket` was
    /// evicted before its slot was recorded
    async fn admit_route(
        &self,
        resolved: &ResolvedBucket,
        mut bucket: Arc<RateLimitBucket>,
    ) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            waited += admit(&bucket).await;

            // A recorded slot keeps the bucket from looking idle, so once it is
            // still mapped here it stays mapped for the rest of the window
            let live = self
                .buckets
                .get(&resolved.key)
                .is_some_and(|current| Arc::ptr_eq(current.value(), &bucket));
            if live {
                return waited;
            }

            tracing::trace!(bucket = %resolved.key, "Bucket evicted during admission, retrying");
            bucket = self.bucket(resolved);
        }
    }

    fn bucket(&self, resolved: &ResolvedBucket) -> Arc<RateLimitBucket> {
        self.buckets
            .entry(resolved.key.clone())
            .or_insert_with(|| {
                tracing::trace!(bucket = %resolved.key, "Creating bucket");
                Arc::new(RateLimitBucket::new(
                    resolved.key.clone(),
                    resolved.rule.limit,
                    resolved.rule.window,
                ))
            })
            .clone()
    }
}

async fn admit(bucket: &RateLimitBucket) -> Duration {
    let first = bucket.acquire();
    if first.is_zero() {
        return Duration::ZERO;
    }
    tokio::time::sleep(first).await;

    let second = bucket.acquire();
    if second.is_zero() {
        return first;
    }

    tracing::warn!(
        bucket = %bucket.key(),
        wait_ms = second.as_millis(),
        "Bucket still exhausted after retry, proceeding after final wait"
    );
    tokio::time::sleep(second).await;
    first + second
}
