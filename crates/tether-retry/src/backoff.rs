//! Exponential backoff schedule

use std::time::Duration;

/// Backoff schedule between retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub initial: Duration,

    /// Upper bound for any single delay
    pub max: Duration,

    /// Growth factor applied per retry
    pub multiplier: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2,
        }
    }
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration, multiplier: u32) -> Self {
        Self {
            initial,
            max,
            multiplier,
        }
    }

    /// Delay before the `retry`-th retry (1-based):
    /// `min(initial * multiplier^(retry - 1), max)`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1);
        let factor = self.multiplier.saturating_pow(exponent);
        self.initial.saturating_mul(factor).min(self.max)
    }

    /// Iterator over successive delays, starting with the first retry
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..).map(move |retry| self.delay_for(retry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = BackoffPolicy::default();
        let delays: Vec<u64> = policy.delays().take(7).map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    }

    #[test]
    fn test_delay_matches_closed_form() {
        let policy = BackoffPolicy::default();
        for n in 1..=10u32 {
            let expected = Duration::from_secs(2u64.pow(n - 1)).min(Duration::from_secs(30));
            assert_eq!(policy.delay_for(n), expected, "retry {}", n);
        }
    }

    #[test]
    fn test_large_retry_count_saturates() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_custom_policy() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(1), 3);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(300));
        assert_eq!(policy.delay_for(3), Duration::from_millis(900));
        assert_eq!(policy.delay_for(4), Duration::from_secs(1));
    }
}
