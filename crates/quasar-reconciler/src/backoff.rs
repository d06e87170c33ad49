use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Per-key exponential failure backoff.
///
/// Each call to `delay` for a key returns `base * 2^failures` (capped at
/// `max`) and increments the key's failure count. `forget` resets the count
/// once the key reconciles successfully.
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        // 5ms..1000s, the usual controller rate-limiter envelope
        Self::new(Duration::from_millis(5), Duration::from_secs(1000))
    }
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Compute the next delay for `key` and record one more failure
    pub fn delay(&self, key: &str) -> Duration {
        let mut failures = self.failures.lock().unwrap();
        let count = failures.entry(key.to_string()).or_insert(0);
        // 2^31 * 5ms already exceeds any sane cap
        let exp = (*count).min(31);
        *count += 1;

        let delay = self.base.saturating_mul(1u32 << exp);
        delay.min(self.max)
    }

    /// Reset the failure count for `key`
    pub fn forget(&self, key: &str) {
        self.failures.lock().unwrap().remove(key);
    }

    /// Number of failures recorded for `key`
    pub fn failures(&self, key: &str) -> u32 {
        self.failures
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_per_failure() {
        let backoff = ExponentialBackoff::default();

        assert_eq!(backoff.delay("k"), Duration::from_millis(5));
        assert_eq!(backoff.delay("k"), Duration::from_millis(10));
        assert_eq!(backoff.delay("k"), Duration::from_millis(20));
        assert_eq!(backoff.failures("k"), 3);
    }

    #[test]
    fn test_delay_is_capped() {
        let backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(8));

        for _ in 0..10 {
            backoff.delay("k");
        }
        assert_eq!(backoff.delay("k"), Duration::from_secs(8));
    }

    #[test]
    fn test_forget_resets() {
        let backoff = ExponentialBackoff::default();

        backoff.delay("k");
        backoff.delay("k");
        backoff.forget("k");

        assert_eq!(backoff.failures("k"), 0);
        assert_eq!(backoff.delay("k"), Duration::from_millis(5));
    }

    #[test]
    fn test_keys_are_independent() {
        let backoff = ExponentialBackoff::default();

        backoff.delay("a");
        backoff.delay("a");
        assert_eq!(backoff.delay("b"), Duration::from_millis(5));
    }
}
