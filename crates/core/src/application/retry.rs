// Connect retry policy
use crate::application::worker::constants::{
    BACKOFF_JITTER_MIN, BACKOFF_JITTER_STEPS, DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP,
    DEFAULT_MAX_ATTEMPTS,
};
use crate::domain::Target;
use crate::error::{AppError, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the connect after this backoff delay
    Retry(Duration),
    /// Do not retry, the target has failed for this cycle
    Failed,
}

/// Exponential backoff for session connects
///
/// Only connect failures are retried. Command failures are not assumed to be
/// transient and are never fed through this policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BACKOFF_BASE,
            max_delay: DEFAULT_BACKOFF_CAP,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    ///
    /// # Arguments
    /// * `max_attempts` - Total connect attempts per cycle (at least 1)
    /// * `base_delay` - Delay after the first failure
    /// * `max_delay` - Cap for any single delay
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(AppError::Config("max_attempts must be at least 1".to_string()));
        }
        if max_delay < base_delay {
            return Err(AppError::Config(format!(
                "backoff cap {:?} is below the base delay {:?}",
                max_delay, base_delay
            )));
        }
        Ok(Self {
            max_attempts,
            base_delay,
            max_delay,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide what to do after `failed_attempts` consecutive connect failures
    pub fn should_retry(&self, target: &Target, failed_attempts: u32) -> RetryDecision {
        if failed_attempts >= self.max_attempts {
            warn!(
                host = %target,
                attempts = failed_attempts,
                max_attempts = self.max_attempts,
                "Max connect attempts reached"
            );
            return RetryDecision::Failed;
        }

        let delay = self.delay_for(target, failed_attempts);
        debug!(
            host = %target,
            attempt = failed_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling connect retry"
        );
        RetryDecision::Retry(delay)
    }

    /// Backoff before the next attempt
    ///
    /// delay = min(base * 2^(failed - 1) * jitter, cap)
    ///
    /// Jitter is derived from the target identifier so that many devices
    /// failing together spread their retries, while one device always gets
    /// the same schedule.
    pub fn delay_for(&self, target: &Target, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(30) as i32;
        let nominal_ms = self.base_delay.as_millis() as f64 * 2f64.powi(exponent);

        let jitter_seed = target
            .id()
            .chars()
            .fold(0u32, |acc, c| acc.wrapping_add(c as u32));
        let jitter = BACKOFF_JITTER_MIN + (jitter_seed % BACKOFF_JITTER_STEPS) as f64 / 100.0;

        let delay = Duration::from_millis((nominal_ms * jitter) as u64);
        delay.min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target::new("10.0.0.1", None)
    }

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn test_retry_until_max_attempts() {
        let policy = RetryPolicy::default();
        assert!(matches!(policy.should_retry(&target(), 1), RetryDecision::Retry(_)));
        assert!(matches!(policy.should_retry(&target(), 2), RetryDecision::Retry(_)));
        assert_eq!(policy.should_retry(&target(), 3), RetryDecision::Failed);
    }

    #[test]
    fn test_backoff_grows_within_jitter_bounds() {
        let policy = RetryPolicy::default();
        let first = policy.delay_for(&target(), 1);
        let second = policy.delay_for(&target(), 2);

        assert!(first >= Duration::from_millis(1800) && first <= Duration::from_millis(2200));
        assert!(second >= Duration::from_millis(3600) && second <= Duration::from_millis(4400));
        assert!(second > first);
    }

    #[test]
    fn test_backoff_capped() {
        let policy = RetryPolicy::new(20, Duration::from_secs(2), Duration::from_secs(60)).unwrap();
        assert_eq!(policy.delay_for(&target(), 10), Duration::from_secs(60));
        assert_eq!(policy.delay_for(&target(), 40), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_is_deterministic_per_target() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(&target(), 2), policy.delay_for(&target(), 2));
    }

    #[test]
    fn test_very_long_identifier_stays_within_jitter_bounds() {
        let policy = RetryPolicy::default();
        let long = Target::new("\u{10FFFF}".repeat(5_000), None);

        let delay = policy.delay_for(&long, 1);
        assert!(delay >= Duration::from_millis(1_800));
        assert!(delay <= Duration::from_millis(2_200));
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(RetryPolicy::new(0, Duration::from_secs(1), Duration::from_secs(2)).is_err());
        assert!(RetryPolicy::new(3, Duration::from_secs(10), Duration::from_secs(2)).is_err());
    }
}
