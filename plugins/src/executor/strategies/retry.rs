use std::time::Duration;

use flowpilot_core::api::{RetryConfig, RetryStrategyPlugin};

/// Doubles the delay after every failed attempt, capped at `max_delay_ms`.
pub struct ExponentialBackoffPlugin {
    config: RetryConfig,
}

/// Grows the delay by `base_delay_ms` after every failed attempt.
pub struct LinearRetryPlugin {
    config: RetryConfig,
}

impl ExponentialBackoffPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl LinearRetryPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

// `attempt` counts the attempts already made, starting at 1.
impl RetryStrategyPlugin for ExponentialBackoffPlugin {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn next_delay(&self, attempt: u32, _error: &str) -> Option<Duration> {
        if attempt == 0 || attempt >= self.config.max_attempts {
            return None;
        }
        let exp = 1u64 << (attempt - 1).min(30);
        let delay = self
            .config
            .base_delay_ms
            .saturating_mul(exp)
            .min(self.config.max_delay_ms);
        Some(Duration::from_millis(delay))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

impl RetryStrategyPlugin for LinearRetryPlugin {
    fn name(&self) -> &str {
        "linear"
    }

    fn next_delay(&self, attempt: u32, _error: &str) -> Option<Duration> {
        if attempt == 0 || attempt >= self.config.max_attempts {
            return None;
        }
        let delay = self
            .config
            .base_delay_ms
            .saturating_mul(attempt as u64)
            .min(self.config.max_delay_ms);
        Some(Duration::from_millis(delay))
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strategy: &str, base: u64, max: u64, attempts: u32) -> RetryConfig {
        RetryConfig {
            strategy: strategy.to_string(),
            base_delay_ms: base,
            max_delay_ms: max,
            max_attempts: attempts,
        }
    }

    #[test]
    fn test_exponential_backoff() {
        let plugin = ExponentialBackoffPlugin::new(config("exponential-backoff", 100, 300, 4));
        assert_eq!(plugin.next_delay(1, "err"), Some(Duration::from_millis(100)));
        assert_eq!(plugin.next_delay(2, "err"), Some(Duration::from_millis(200)));
        assert_eq!(plugin.next_delay(3, "err"), Some(Duration::from_millis(300)));
        assert_eq!(plugin.next_delay(4, "err"), None);
        assert!(plugin.should_retry(3, "err"));
        assert!(!plugin.should_retry(4, "err"));
    }

    #[test]
    fn test_linear_backoff() {
        let plugin = LinearRetryPlugin::new(config("linear", 50, 120, 5));
        assert_eq!(plugin.next_delay(1, "err"), Some(Duration::from_millis(50)));
        assert_eq!(plugin.next_delay(2, "err"), Some(Duration::from_millis(100)));
        assert_eq!(plugin.next_delay(3, "err"), Some(Duration::from_millis(120)));
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let plugin = LinearRetryPlugin::new(config("linear", 50, 120, 1));
        assert_eq!(plugin.next_delay(1, "err"), None);
        assert!(!plugin.should_retry(1, "err"));
    }
}
