//! Retry classification and exponential backoff.
//!
//! Decides whether a failed fetch is worth another attempt and how long to
//! wait before it. Transport failures, 429 and 5xx retry; other 4xx are
//! definitive.

use std::time::Duration;

use rand::Rng;

use crate::http_client::FetchError;

/// Retry budget and backoff bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Additional attempts after the first.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
    /// Apply +-25% jitter to computed delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter: true,
        }
    }
}

/// Outcome of classifying a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
}

/// Classify a failure. Rules apply in order; anything unrecognised retries.
pub fn classify(error: &FetchError) -> RetryDecision {
    let retry = match error {
        FetchError::Timeout | FetchError::Network(_) => true,
        FetchError::RateLimitExceeded { .. } => true,
        FetchError::Http { status, .. } if (500..600).contains(status) => true,
        FetchError::Http { status, .. } if (400..500).contains(status) => false,
        FetchError::InvalidUrl(_) | FetchError::Cancelled => false,
        FetchError::Http { .. } | FetchError::MalformedPage(_) | FetchError::Other(_) => true,
    };
    RetryDecision { retry }
}

/// Retry policy applied by the HTTP client.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether to try again after `attempts_made` retries have already run.
    pub fn should_retry(&self, error: &FetchError, attempts_made: u32) -> bool {
        classify(error).retry && attempts_made < self.config.max_retries
    }

    /// Jitter-free delay before retry `retry` (1-indexed).
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        let base_ms = self.config.base_delay.as_millis() as u64;
        let max_ms = self.config.max_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << exponent).min(max_ms);
        Duration::from_millis(delay_ms)
    }

    /// Delay before retry `retry` (1-indexed), jittered by +-25% and clamped
    /// to `[0, max_delay]`.
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let nominal = self.nominal_delay(retry);
        if !self.config.jitter {
            return nominal;
        }

        let delay_ms = nominal.as_millis() as f64;
        let spread = delay_ms * 0.25;
        let offset = rand::thread_rng().gen_range(-spread..=spread);
        let max_ms = self.config.max_delay.as_millis() as f64;
        Duration::from_millis((delay_ms + offset).clamp(0.0, max_ms) as u64)
    }

    /// Delay before retry `retry`, raised to any server-requested
    /// Retry-After and still capped at `max_delay`.
    pub fn delay_for(&self, retry: u32, error: &FetchError) -> Duration {
        let backoff = self.backoff_delay(retry);
        match error.retry_after() {
            Some(requested) => backoff.max(requested).min(self.config.max_delay),
            None => backoff,
        }
    }
}
