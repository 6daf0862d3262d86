//! Reconnection delay policy

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Shortest delay ever waited between attempts
pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(10);

/// How a subscription waits between reconnection attempts
///
/// Delay for attempt `n` (1-based) is `initial_delay * multiplier^(n-1)`,
/// capped at `max_delay`. The defaults retry forever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// First delay after an interruption, in milliseconds
    #[serde(rename = "initial_delay_ms", with = "crate::config::millis")]
    pub initial_delay: Duration,

    /// Upper bound on any delay, in milliseconds
    #[serde(rename = "max_delay_ms", with = "crate::config::millis")]
    pub max_delay: Duration,

    /// Growth factor between consecutive attempts
    pub multiplier: u32,

    /// Give up after this many consecutive failed attempts (`None` = never)
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(30),
            multiplier: 2,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Fixed delay between attempts, retrying forever
    pub fn fixed(delay: Duration) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }
}

/// Running backoff state for one subscription
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    policy: ReconnectPolicy,
    attempt: u32,
}

impl Backoff {
    pub(crate) fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Delay before the next attempt, or `None` once attempts are used up
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.policy.max_attempts {
            if self.attempt >= max {
                return None;
            }
        }

        let factor = self
            .policy
            .multiplier
            .max(1)
            .saturating_pow(self.attempt.min(31));
        self.attempt = self.attempt.saturating_add(1);

        let delay = self
            .policy
            .initial_delay
            .saturating_mul(factor)
            .min(self.policy.max_delay);
        Some(delay.max(MIN_RETRY_DELAY))
    }

    /// Attempts made since the last successful connection
    pub(crate) fn attempts(&self) -> u32 {
        self.attempt
    }

    /// A connection opened; start over from the initial delay
    pub(crate) fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Server sent `retry:`; it replaces the initial delay
    pub(crate) fn set_initial_delay(&mut self, delay: Duration) {
        self.policy.initial_delay = delay;
        if self.policy.max_delay < delay {
            self.policy.max_delay = delay;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.initial_delay, Duration::from_secs(3));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.multiplier, 2);
        assert_eq!(policy.max_attempts, None);
    }

    #[test]
    fn test_backoff_calculation() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());

        // 3s, 6s, 12s, 24s, then capped at 30s
        let delays: Vec<u64> = (0..6)
            .map(|_| backoff.next_delay().unwrap().as_secs())
            .collect();
        assert_eq!(delays, vec![3, 6, 12, 24, 30, 30]);
        assert_eq!(backoff.attempts(), 6);
    }

    #[test]
    fn test_backoff_never_exhausts_by_default() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        for _ in 0..1000 {
            assert!(backoff.next_delay().is_some());
        }
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_backoff_max_attempts() {
        let mut backoff = Backoff::new(
            ReconnectPolicy::fixed(Duration::from_millis(50)).with_max_attempts(2),
        );
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(50)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(50)));
        assert_eq!(backoff.next_delay(), None);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_zero_delay_is_floored() {
        let mut backoff = Backoff::new(ReconnectPolicy::fixed(Duration::ZERO));
        assert_eq!(backoff.next_delay(), Some(MIN_RETRY_DELAY));
    }

    #[test]
    fn test_server_retry_replaces_initial_delay() {
        let mut backoff = Backoff::new(ReconnectPolicy::default());
        backoff.set_initial_delay(Duration::from_secs(60));
        assert_eq!(backoff.next_delay(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_policy_deserialize_partial() {
        let policy: ReconnectPolicy =
            serde_json::from_str(r#"{"initial_delay_ms": 500, "max_attempts": 4}"#).unwrap();
        assert_eq!(policy.initial_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert_eq!(policy.max_attempts, Some(4));
    }
}
