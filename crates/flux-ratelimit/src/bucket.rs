//! Sliding-window bucket
//!
//! Tracks the timestamps of admitted requests inside the trailing window.
//! Every operation runs prune/check/record under one lock, so concurrent
//! callers can never both be admitted for the last free slot.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// A sliding-window counter guarding one resolved bucket key
#[derive(Debug)]
pub struct RateLimitBucket {
    key: String,
    limit: u32,
    window: Duration,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    timestamps: VecDeque<Instant>,
    last_used: Instant,
}

impl BucketState {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn wait_for_slot(&self, now: Instant, window: Duration) -> Duration {
        match self.timestamps.front() {
            Some(&oldest) => (oldest + window).saturating_duration_since(now),
            None => window,
        }
    }
}

impl RateLimitBucket {
    /// Create an empty bucket
    pub fn new(key: impl Into<String>, limit: u32, window: Duration) -> Self {
        Self {
            key: key.into(),
            limit,
            window,
            state: Mutex::new(BucketState {
                timestamps: VecDeque::with_capacity(limit as usize),
                last_used: Instant::now(),
            }),
        }
    }

    /// Resolved key this bucket guards
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Maximum requests per window
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Window length
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Try to take a slot.
    ///
    /// Returns `Duration::ZERO` when the request was admitted and recorded,
    /// otherwise the time until the oldest recorded request leaves the window.
    /// A rejected call records nothing.
    pub fn acquire(&self) -> Duration {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.prune(now, self.window);
        state.last_used = now;

        if state.timestamps.len() < self.limit as usize {
            state.timestamps.push_back(now);
            return Duration::ZERO;
        }

        let wait = state.wait_for_slot(now, self.window);
        tracing::trace!(
            bucket = %self.key,
            limit = self.limit,
            wait_ms = wait.as_millis(),
            "Bucket exhausted"
        );
        wait
    }

    /// Wait that `acquire` would return right now, without recording
    pub fn peek_wait(&self) -> Duration {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.prune(now, self.window);

        if state.timestamps.len() < self.limit as usize {
            Duration::ZERO
        } else {
            state.wait_for_slot(now, self.window)
        }
    }

    /// Free slots in the current window
    pub fn remaining(&self) -> u32 {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.prune(now, self.window);
        self.limit
            .saturating_sub(u32::try_from(state.timestamps.len()).unwrap_or(u32::MAX))
    }

    /// Time until the oldest recorded request leaves the window
    ///
    /// Zero when the bucket holds no timestamps.
    pub fn reset_time(&self) -> Duration {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.prune(now, self.window);
        state
            .timestamps
            .front()
            .map_or(Duration::ZERO, |&oldest| {
                (oldest + self.window).saturating_duration_since(now)
            })
    }

    /// Drop every recorded timestamp
    pub fn reset(&self) {
        self.state.lock().timestamps.clear();
    }

    /// True when the window is empty and the bucket was untouched for `max_idle`
    pub fn is_idle(&self, max_idle: Duration) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();
        state.prune(now, self.window);
        state.timestamps.is_empty() && now.saturating_duration_since(state.last_used) >= max_idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_admits_up_to_limit() {
        let bucket = RateLimitBucket::new("test", 3, Duration::from_secs(1));

        for _ in 0..3 {
            assert_eq!(bucket.acquire(), Duration::ZERO);
        }
        assert_eq!(bucket.remaining(), 0);

        let wait = bucket.acquire();
        assert_eq!(wait, Duration::from_secs(1));
        // Rejected calls are not recorded
        assert_eq!(bucket.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_measured_from_oldest() {
        let bucket = RateLimitBucket::new("test", 2, Duration::from_millis(1000));

        assert_eq!(bucket.acquire(), Duration::ZERO);
        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(bucket.acquire(), Duration::ZERO);
        tokio::time::advance(Duration::from_millis(200)).await;

        // oldest + window - now = 0 + 1000 - 500
        assert_eq!(bucket.acquire(), Duration::from_millis(500));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(bucket.acquire(), Duration::ZERO);
        // The second request is still inside the window
        assert_eq!(bucket.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_not_fixed_window() {
        let bucket = RateLimitBucket::new("test", 2, Duration::from_millis(1000));

        tokio::time::advance(Duration::from_millis(900)).await;
        bucket.acquire();
        bucket.acquire();

        // A fixed window would reset at t=1000 and allow a burst here.
        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(bucket.acquire(), Duration::from_millis(850));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_time_and_reset() {
        let bucket = RateLimitBucket::new("test", 5, Duration::from_secs(10));
        assert_eq!(bucket.reset_time(), Duration::ZERO);

        bucket.acquire();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(bucket.reset_time(), Duration::from_secs(6));
        assert_eq!(bucket.remaining(), 4);

        bucket.reset();
        assert_eq!(bucket.remaining(), 5);
        assert_eq!(bucket.reset_time(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_peek_does_not_record() {
        let bucket = RateLimitBucket::new("test", 1, Duration::from_secs(1));
        assert_eq!(bucket.peek_wait(), Duration::ZERO);
        assert_eq!(bucket.remaining(), 1);
        bucket.acquire();
        assert_eq!(bucket.peek_wait(), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_detection() {
        let bucket = RateLimitBucket::new("test", 1, Duration::from_secs(1));
        bucket.acquire();
        assert!(!bucket.is_idle(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(bucket.is_idle(Duration::from_secs(5)));
    }

    #[test]
    fn test_concurrent_callers_never_over_admit() {
        let bucket = Arc::new(RateLimitBucket::new("race", 10, Duration::from_secs(3600)));

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let bucket = Arc::clone(&bucket);
                std::thread::spawn(move || bucket.acquire() == Duration::ZERO)
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|admitted| *admitted)
            .count();

        assert_eq!(admitted, 10);
    }
}
