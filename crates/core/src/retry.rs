//! Retry policy with capped exponential backoff
//!
//! The transport retries transient failures with a bounded number of
//! attempts. Waits grow exponentially from `min_wait` and are capped at
//! `max_wait`; no jitter is applied, so the wait never decreases from one
//! attempt to the next.
//!
//! # Example
//!
//! ```rust
//! use gqlrun_core::retry::RetryConfig;
//! use std::time::Duration;
//!
//! let config = RetryConfig::default();
//! assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
//! assert!(config.delay_for_attempt(2) >= config.delay_for_attempt(1));
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Wait before the first retry
    #[serde(with = "millis")]
    pub min_wait: Duration,
    /// Upper bound for any single wait
    #[serde(with = "millis")]
    pub max_wait: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            min_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

impl RetryConfig {
    /// Create a config from the three externally supplied bounds
    pub fn new(max_attempts: u32, min_wait: Duration, max_wait: Duration) -> Self {
        Self {
            max_attempts,
            min_wait,
            max_wait,
            ..Self::default()
        }
    }

    /// Create a config for quick retries
    pub fn quick() -> Self {
        Self {
            max_attempts: 3,
            min_wait: Duration::from_millis(50),
            max_wait: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        }
    }

    /// Create a config for patient retries
    pub fn patient() -> Self {
        Self {
            max_attempts: 6,
            min_wait: Duration::from_millis(500),
            max_wait: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }

    /// Create a config with no retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            min_wait: Duration::ZERO,
            max_wait: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Total attempts, never fewer than one
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Calculate the wait before a given attempt (attempt 0 is the first try)
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let multiplier = self.backoff_multiplier.max(1.0);
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let min_nanos = u64::try_from(self.min_wait.as_nanos()).unwrap_or(u64::MAX);
        let ceiling = u64::try_from(self.max_wait.max(self.min_wait).as_nanos()).unwrap_or(u64::MAX);

        let base = min_nanos as f64 * multiplier.powi(exponent);

        if base.is_finite() && base < ceiling as f64 {
            Duration::from_nanos(base as u64)
        } else {
            Duration::from_nanos(ceiling)
        }
    }

    /// Check the bounds are usable
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry max_attempts must be at least 1".to_string());
        }
        if self.min_wait > self.max_wait {
            return Err(format!(
                "retry min_wait ({:?}) exceeds max_wait ({:?})",
                self.min_wait, self.max_wait
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err("retry backoff_multiplier must be a finite value >= 1.0".to_string());
        }
        Ok(())
    }
}
