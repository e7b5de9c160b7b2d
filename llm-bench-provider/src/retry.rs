//! Retry policies with exponential backoff and jitter.
//!
//! A policy only answers "how long until the next attempt, if any"; error
//! classification stays with [`ProviderError::is_retryable`](llm_bench_core::ProviderError::is_retryable)
//! and the sleep loop lives in [`GenerationClient`](crate::GenerationClient).
//!
//! # Example
//!
//! ```
//! use llm_bench_provider::retry::{ExponentialBackoff, JitterStrategy, RetryConfig, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = ExponentialBackoff::new(RetryConfig {
//!     max_attempts: 3,
//!     initial_delay: Duration::from_millis(100),
//!     max_delay: Duration::from_secs(1),
//!     multiplier: 2.0,
//!     jitter: JitterStrategy::None,
//! });
//!
//! assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
//! assert_eq!(policy.next_delay(2), Some(Duration::from_millis(200)));
//! assert_eq!(policy.next_delay(3), None);
//! ```

use llm_bench_core::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::serde_millis;

/// Backoff settings for provider calls. Delays serialize as milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, including the first one
    pub max_attempts: usize,
    /// Delay after the first failure
    #[serde(rename = "initial_delay_ms", with = "serde_millis")]
    pub initial_delay: Duration,
    /// Upper bound for any computed delay
    #[serde(rename = "max_delay_ms", with = "serde_millis")]
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Randomisation of computed delays
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: JitterStrategy::None,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_delays(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_delay = initial;
        self.max_delay = max;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Reject settings that would stall or break the backoff loop.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(CoreError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(CoreError::Config(format!(
                "retry.multiplier must be a finite number >= 1, got {}",
                self.multiplier
            )));
        }

        if self.initial_delay > self.max_delay {
            return Err(CoreError::Config(format!(
                "retry.initial_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.initial_delay.as_millis(),
                self.max_delay.as_millis()
            )));
        }

        Ok(())
    }
}

/// Randomisation applied on top of the computed delay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterStrategy {
    /// Use the computed delay as is
    #[default]
    None,
    /// Uniform in `[0, delay)`
    Full,
    /// `delay / 2` plus a uniform share of the other half
    Equal,
}

impl JitterStrategy {
    fn apply(self, delay: Duration) -> Duration {
        match self {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                let jitter = rand::random::<f64>();
                Duration::from_secs_f64(delay.as_secs_f64() * jitter)
            }
            JitterStrategy::Equal => {
                let jitter = rand::random::<f64>();
                let base = delay.as_secs_f64() / 2.0;
                Duration::from_secs_f64(base + (base * jitter))
            }
        }
    }
}

/// Decides whether and when a failed provider call is attempted again.
pub trait RetryPolicy: Send + Sync {
    /// Delay to wait after `failed_attempts` consecutive failures.
    ///
    /// Returns `None` once the attempt budget is spent.
    fn next_delay(&self, failed_attempts: usize) -> Option<Duration>;

    /// Maximum number of attempts, including the first
    fn max_attempts(&self) -> usize;
}

/// `initial_delay * multiplier^(n-1)`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: RetryConfig,
}

impl ExponentialBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn next_delay(&self, failed_attempts: usize) -> Option<Duration> {
        if failed_attempts == 0 || failed_attempts >= self.config.max_attempts {
            return None;
        }

        let exponent = (failed_attempts - 1).min(i32::MAX as usize) as i32;
        let base_delay =
            self.config.initial_delay.as_secs_f64() * self.config.multiplier.powi(exponent);

        // Out-of-range results (negative, NaN) fall back to the cap
        let delay = Duration::try_from_secs_f64(base_delay.min(self.config.max_delay.as_secs_f64()))
            .unwrap_or(self.config.max_delay);

        Some(self.config.jitter.apply(delay))
    }

    fn max_attempts(&self) -> usize {
        self.config.max_attempts
    }
}

/// Same delay after every failure.
#[derive(Debug, Clone)]
pub struct ConstantBackoff {
    max_attempts: usize,
    delay: Duration,
}

impl ConstantBackoff {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl RetryPolicy for ConstantBackoff {
    fn next_delay(&self, failed_attempts: usize) -> Option<Duration> {
        if failed_attempts == 0 || failed_attempts >= self.max_attempts {
            None
        } else {
            Some(self.delay)
        }
    }

    fn max_attempts(&self) -> usize {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(max_attempts: usize) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: JitterStrategy::None,
        }
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay, Duration::from_secs(4));
        assert_eq!(config.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_exponential_backoff_delays() {
        let policy = ExponentialBackoff::new(no_jitter(5));

        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.next_delay(3), Some(Duration::from_millis(400)));
        assert_eq!(policy.next_delay(4), Some(Duration::from_millis(800)));
        assert_eq!(policy.next_delay(5), None);
    }

    #[test]
    fn test_exponential_backoff_max_delay() {
        let policy = ExponentialBackoff::new(RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: JitterStrategy::None,
        });

        assert_eq!(policy.next_delay(6), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_default_policy_sequence_is_capped() {
        let policy = ExponentialBackoff::default();
        let delays: Vec<_> = (1..5).filter_map(|n| policy.next_delay(n)).collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(10),
                Duration::from_secs(10),
            ]
        );
    }

    #[test]
    fn test_jitter_stays_below_base_delay() {
        let policy = ExponentialBackoff::new(no_jitter(5).with_jitter(JitterStrategy::Full));

        for _ in 0..20 {
            let delay = policy.next_delay(2).unwrap();
            assert!(delay <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_equal_jitter_keeps_half() {
        let policy = ExponentialBackoff::new(no_jitter(5).with_jitter(JitterStrategy::Equal));

        for _ in 0..20 {
            let delay = policy.next_delay(2).unwrap();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(200));
        }
    }

    #[test]
    fn test_constant_backoff() {
        let policy = ConstantBackoff::new(3, Duration::from_millis(100));

        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(3), None);
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let policy = ExponentialBackoff::new(no_jitter(1));
        assert_eq!(policy.next_delay(1), None);
    }

    #[test]
    fn test_config_deserializes_millis() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"max_attempts": 3, "initial_delay_ms": 250}"#).unwrap();

        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay, Duration::from_millis(250));
        assert_eq!(config.max_delay, Duration::from_secs(10));
        assert_eq!(config.jitter, JitterStrategy::None);
    }

    #[test]
    fn test_config_deserializes_jitter_strategy() {
        let config: RetryConfig = serde_json::from_str(r#"{"jitter": "equal"}"#).unwrap();
        assert_eq!(config.jitter, JitterStrategy::Equal);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(RetryConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let cases = [
            RetryConfig::default().with_max_attempts(0),
            RetryConfig::default().with_multiplier(-2.0),
            RetryConfig::default().with_multiplier(0.5),
            RetryConfig::default().with_multiplier(f64::NAN),
            RetryConfig::default().with_delays(Duration::from_secs(20), Duration::from_secs(10)),
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(CoreError::Config(_))),
                "{config:?}"
            );
        }
    }

    #[test]
    fn test_negative_multiplier_does_not_panic() {
        let policy = ExponentialBackoff::new(no_jitter(5).with_multiplier(-2.0));

        assert_eq!(policy.next_delay(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.next_delay(2), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_huge_multiplier_is_capped() {
        let policy = ExponentialBackoff::new(no_jitter(5).with_multiplier(1e300));
        assert_eq!(policy.next_delay(4), Some(Duration::from_secs(10)));
    }
}
