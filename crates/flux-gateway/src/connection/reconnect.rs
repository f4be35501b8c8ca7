//! Reconnect backoff policy

use std::time::Duration;

use flux_common::ReconnectConfig;
use rand::Rng;

use crate::error::GatewayError;

/// Exponential backoff with optional jitter and an optional attempt cap
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    factor: f64,
    jitter: f64,
    max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Build a policy, rejecting nonsensical parameters
    pub fn from_config(config: &ReconnectConfig) -> Result<Self, GatewayError> {
        let policy = Self {
            initial_delay: config.base_delay(),
            max_delay: config.max_delay(),
            factor: config.factor,
            jitter: config.jitter,
            max_attempts: config.max_attempts,
        };
        policy.validate()?;
        Ok(policy)
    }

    fn validate(&self) -> Result<(), GatewayError> {
        let invalid = |msg: &str| Err(GatewayError::InvalidConfig(msg.to_string()));

        if self.initial_delay.is_zero() {
            return invalid("initial reconnect delay must be > 0");
        }
        if self.max_delay < self.initial_delay {
            return invalid("max reconnect delay must be >= initial reconnect delay");
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return invalid("backoff factor must be >= 1.0");
        }
        if !self.jitter.is_finite() || !(0.0..=1.0).contains(&self.jitter) {
            return invalid("jitter must be between 0.0 and 1.0");
        }
        Ok(())
    }

    #[must_use]
    pub const fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Check if attempt number `attempt` (0-based) may still run
    #[must_use]
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt < max)
    }

    /// Delay before attempt number `attempt` (0-based)
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let initial = self.initial_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = (initial * self.factor.powi(exponent)).min(max);

        if self.jitter == 0.0 {
            return Duration::from_secs_f64(base);
        }

        let randomized = rand::thread_rng().gen_range(0.0..=base);
        let blended = base * (1.0 - self.jitter) + randomized * self.jitter;
        Duration::from_secs_f64(blended)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            factor: 2.0,
            jitter: 0.0,
            max_attempts: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ReconnectConfig {
        ReconnectConfig {
            base_delay_ms: 100,
            max_delay_ms: 1000,
            factor: 2.0,
            jitter: 0.0,
            max_attempts: None,
        }
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let policy = ReconnectPolicy::from_config(&config()).unwrap();

        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(4), Duration::from_millis(1000));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = ReconnectPolicy::from_config(&ReconnectConfig {
            jitter: 1.0,
            ..config()
        })
        .unwrap();

        for _ in 0..100 {
            assert!(policy.backoff(2) <= Duration::from_millis(400));
        }
    }

    #[test]
    fn test_attempt_cap() {
        let unbounded = ReconnectPolicy::from_config(&config()).unwrap();
        assert!(unbounded.allows(u32::MAX - 1));

        let capped = ReconnectPolicy::from_config(&config().with_max_attempts(2)).unwrap();
        assert!(capped.allows(0));
        assert!(capped.allows(1));
        assert!(!capped.allows(2));
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let zero = ReconnectConfig {
            base_delay_ms: 0,
            ..config()
        };
        assert!(ReconnectPolicy::from_config(&zero).is_err());

        let inverted = ReconnectConfig {
            max_delay_ms: 50,
            ..config()
        };
        assert!(ReconnectPolicy::from_config(&inverted).is_err());

        let shrinking = ReconnectConfig {
            factor: 0.5,
            ..config()
        };
        assert!(ReconnectPolicy::from_config(&shrinking).is_err());

        let jitter = ReconnectConfig {
            jitter: 1.5,
            ..config()
        };
        assert!(matches!(
            ReconnectPolicy::from_config(&jitter),
            Err(GatewayError::InvalidConfig(_))
        ));
    }
}
