//! Retry policy for settlement attempts that lose an optimistic-lock race

use std::time::Duration;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl RetryPolicy {
    /// Whether another attempt may follow `attempt` (1-indexed) failing with `error`
    pub fn should_retry(&self, attempt: u32, error: &AppError) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }

    /// Delay before the attempt after `attempt`
    ///
    /// Uses formula: base * 2^(n-1), capped at max
    pub fn backoff(&self, attempt: u32) -> Duration {
        let n = attempt.max(1);
        let factor = 2_u32.saturating_pow(n - 1);
        self.backoff_base.saturating_mul(factor).min(self.backoff_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(20),
            backoff_max: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_backoff_progression() {
        let policy = policy();
        assert_eq!(policy.backoff(1), Duration::from_millis(20));
        assert_eq!(policy.backoff(2), Duration::from_millis(40));
        assert_eq!(policy.backoff(5), Duration::from_millis(320));
        // 640 capped
        assert_eq!(policy.backoff(6), Duration::from_millis(500));
        assert_eq!(policy.backoff(60), Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_with_zero() {
        assert_eq!(policy().backoff(0), Duration::from_millis(20));
    }

    #[test]
    fn test_only_conflicts_are_retried_within_budget() {
        let policy = policy();
        let conflict = AppError::ConcurrencyConflict {
            account_id: "a".into(),
        };
        assert!(policy.should_retry(1, &conflict));
        assert!(policy.should_retry(2, &conflict));
        assert!(!policy.should_retry(3, &conflict));
        assert!(!policy.should_retry(1, &AppError::PersistenceFailure("down".into())));
    }
}
