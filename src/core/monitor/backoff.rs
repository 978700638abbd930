use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff parameters for a collector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub max: Duration,
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

/// Tracks the retry delay after consecutive failures.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: u32,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        let initial = policy.initial.max(Duration::from_millis(1));
        let max = policy.max.max(initial);
        Self {
            initial,
            max,
            multiplier: policy.multiplier.max(1),
            current: initial,
        }
    }

    /// Record a failure: returns the delay to wait and grows the next one.
    pub fn mark_failure(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .checked_mul(self.multiplier)
            .unwrap_or(self.max)
            .min(self.max);
        delay
    }

    /// Reset after a successful attempt.
    pub fn mark_success(&mut self) {
        self.current = self.initial;
    }

    pub fn current(&self) -> Duration {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let mut backoff = Backoff::new(BackoffPolicy {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(350),
            multiplier: 2,
        });

        assert_eq!(backoff.mark_failure(), Duration::from_millis(100));
        assert_eq!(backoff.mark_failure(), Duration::from_millis(200));
        assert_eq!(backoff.mark_failure(), Duration::from_millis(350));
        assert_eq!(backoff.mark_failure(), Duration::from_millis(350));
    }

    #[test]
    fn test_success_resets_delay() {
        let mut backoff = Backoff::new(BackoffPolicy::default());
        backoff.mark_failure();
        backoff.mark_failure();
        backoff.mark_success();
        assert_eq!(backoff.current(), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_cap_does_not_overflow() {
        let mut backoff = Backoff::new(BackoffPolicy {
            initial: Duration::from_secs(u64::MAX / 4),
            max: Duration::MAX,
            multiplier: 10,
        });

        assert_eq!(backoff.mark_failure(), Duration::from_secs(u64::MAX / 4));
        assert_eq!(backoff.mark_failure(), Duration::MAX);
        assert_eq!(backoff.mark_failure(), Duration::MAX);
    }

    #[test]
    fn test_max_never_below_initial() {
        let backoff = Backoff::new(BackoffPolicy {
            initial: Duration::from_secs(5),
            max: Duration::from_secs(1),
            multiplier: 2,
        });
        assert_eq!(backoff.current(), Duration::from_secs(5));
    }
}
