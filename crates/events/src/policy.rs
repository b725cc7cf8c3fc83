//! Retry budget and concurrency limits applied by the dispatcher.

/// Hard cap on concurrent handler invocations per subscription.
pub const MAX_CONCURRENCY: usize = 10;

/// Clamp a requested concurrency bound into `1..=MAX_CONCURRENCY`.
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(1, MAX_CONCURRENCY)
}

/// Delivery retry budget.
///
/// `retry_count` on an envelope is the number of failures already recorded
/// against it; a message is redelivered while that count stays below
/// `max_attempts` and quarantined once it reaches it. The same ceiling is
/// handed to the orchestration layer so the ledger and the broker agree on
/// when a job is terminally failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether a delivery with `retry_count` recorded failures gets another
    /// attempt.
    pub fn should_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retries_stop_at_the_ceiling() {
        let policy = RetryPolicy::new(3);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!policy.should_retry(4));
    }

    #[test]
    fn zero_attempts_means_no_retries() {
        let policy = RetryPolicy::new(0);
        assert!(!policy.should_retry(0));
    }

    #[test]
    fn concurrency_is_clamped_to_the_cap() {
        assert_eq!(clamp_concurrency(0), 1);
        assert_eq!(clamp_concurrency(4), 4);
        assert_eq!(clamp_concurrency(10), 10);
        assert_eq!(clamp_concurrency(64), MAX_CONCURRENCY);
    }
}
