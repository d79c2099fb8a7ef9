//! Per-operation attempt counting and exponential-backoff scheduling.
//!
//! The first attempt incurs no delay; the Nth failed attempt (N >= 1) is
//! followed by a `base * 2^(N-1)` sleep before attempt N+1.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

#[derive(Debug, Default, Clone, Copy)]
struct RetryState {
    attempts: u32,
}

/// Thread-safe, opaque per-operation-key retry bookkeeping.
#[derive(Debug, Clone)]
pub struct RetryManager {
    max_retry_attempts: u32,
    base_retry_delay: Duration,
    state: Arc<Mutex<HashMap<String, RetryState>>>,
}

impl RetryManager {
    pub fn new(max_retry_attempts: u32, base_retry_delay: Duration) -> Self {
        Self {
            max_retry_attempts,
            base_retry_delay,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `true` iff `attempts[op] < max_retry_attempts`.
    pub async fn should_retry(&self, op: &str) -> bool {
        let state = self.state.lock().await;
        let attempts = state.get(op).map(|s| s.attempts).unwrap_or(0);
        attempts < self.max_retry_attempts
    }

    /// Increments `attempts[op]`.
    pub async fn record_attempt(&self, op: &str) {
        let mut state = self.state.lock().await;
        let entry = state.entry(op.to_string()).or_default();
        entry.attempts += 1;
        if entry.attempts >= self.max_retry_attempts {
            tracing::warn!(operation = op, attempts = entry.attempts, "retry attempts exhausted");
        } else {
            tracing::debug!(operation = op, attempts = entry.attempts, "recorded retry attempt");
        }
    }

    /// `base_retry_delay * 2^(attempts[op] - 1)` on attempts >= 1, else zero.
    /// Delay is applied after a failed attempt, before the next.
    pub async fn get_delay(&self, op: &str) -> Duration {
        let state = self.state.lock().await;
        let attempts = state.get(op).map(|s| s.attempts).unwrap_or(0);
        if attempts == 0 {
            Duration::ZERO
        } else {
            self.base_retry_delay * 2u32.saturating_pow(attempts - 1)
        }
    }

    /// Resets the attempt counter for `op`, normally called on success.
    pub async fn reset(&self, op: &str) {
        let mut state = self.state.lock().await;
        state.remove(op);
    }

    #[cfg(test)]
    pub(crate) async fn attempts(&self, op: &str) -> u32 {
        let state = self.state.lock().await;
        state.get(op).map(|s| s.attempts).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delays_follow_exponential_backoff() {
        // attempts 1..5 with base=1s, max=5 yield delays {0,1,2,4,8} before
        // attempts 2..5, then should_retry returns false.
        let rm = RetryManager::new(5, Duration::from_secs(1));
        let op = "create_order";
        let delays_before_attempt = [0u64, 1, 2, 4, 8];

        for delay in delays_before_attempt {
            assert_eq!(rm.get_delay(op).await, Duration::from_secs(delay));
            assert!(rm.should_retry(op).await);
            rm.record_attempt(op).await;
        }

        assert!(!rm.should_retry(op).await);
    }

    #[tokio::test]
    async fn should_retry_false_after_max_attempts() {
        let rm = RetryManager::new(5, Duration::from_secs(1));
        for _ in 0..5 {
            rm.record_attempt("op").await;
        }
        assert!(!rm.should_retry("op").await);
    }

    #[tokio::test]
    async fn reset_clears_attempts() {
        let rm = RetryManager::new(3, Duration::from_secs(1));
        rm.record_attempt("op").await;
        rm.record_attempt("op").await;
        rm.reset("op").await;
        assert_eq!(rm.attempts("op").await, 0);
        assert_eq!(rm.get_delay("op").await, Duration::ZERO);
    }

    #[tokio::test]
    async fn operations_are_independent() {
        let rm = RetryManager::new(3, Duration::from_secs(1));
        rm.record_attempt("a").await;
        assert_eq!(rm.attempts("a").await, 1);
        assert_eq!(rm.attempts("b").await, 0);
    }
}
