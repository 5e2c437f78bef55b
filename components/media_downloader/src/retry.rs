// components/media_downloader/src/retry.rs
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff for transient transfer failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `retries_done` retries
    pub fn allows_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }

    /// Delay before the `retry`th retry (1-based), capped at `max_delay`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let secs = self.base_delay.as_secs_f64() * factor;

        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(3, 4)]
    #[case(5, 16)]
    #[case(6, 30)]
    #[case(1000, 30)]
    fn test_backoff_grows_and_caps(#[case] retry: u32, #[case] expected_secs: u64) {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(retry), Duration::from_secs(expected_secs));
    }

    #[test]
    fn test_retry_budget() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry(0));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));

        let none = RetryPolicy {
            max_retries: 0,
            ..RetryPolicy::default()
        };
        assert!(!none.allows_retry(0));
    }
}
