//! Token bucket rate limiter.
//!
//! Caps the outbound request rate while allowing short bursts. The refill and
//! consume steps run under one lock so a single limiter can be shared by
//! several crawl sessions.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::config::RateLimitConfig;
use super::RateLimitError;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl BucketState {
    fn refill(&mut self, config: &RateLimitConfig, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let capacity = f64::from(config.capacity);
        self.tokens =
            (self.tokens + elapsed.as_secs_f64() * config.refill_rate_per_second).min(capacity);
        self.last_refill = now;
    }
}

/// Token bucket limiter. Clones share the same bucket.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Arc<Mutex<BucketState>>,
}

impl RateLimiter {
    /// Create a new rate limiter with default config.
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    /// Create a new rate limiter with custom config. The bucket starts full.
    /// Out-of-range values are normalized (see [`RateLimitConfig::normalized`]).
    pub fn with_config(config: RateLimitConfig) -> Self {
        let config = config.normalized();
        let state = BucketState {
            tokens: f64::from(config.capacity),
            last_refill: Instant::now(),
        };
        Self {
            config,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Consume one token if available. Never waits.
    pub fn try_consume(&self) -> bool {
        let mut state = self.lock_state();
        state.refill(&self.config, Instant::now());
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently available (after refilling).
    pub fn available_tokens(&self) -> f64 {
        let mut state = self.lock_state();
        state.refill(&self.config, Instant::now());
        state.tokens
    }

    /// Wait until a token is available, then consume it.
    ///
    /// Sleeps one token's worth of time between attempts. Returns
    /// `RateLimitError::Cancelled` if the token fires while waiting.
    pub async fn wait_for_token(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        let interval = self.config.token_interval();
        loop {
            if cancel.is_cancelled() {
                return Err(RateLimitError::Cancelled);
            }
            if self.try_consume() {
                return Ok(());
            }

            debug!(
                wait_ms = interval.as_millis() as u64,
                "Rate limit bucket empty, waiting for refill"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_waits_one_token() {
        let limiter = RateLimiter::with_config(RateLimitConfig::new(2.0, 3));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        for _ in 0..3 {
            limiter.wait_for_token(&cancel).await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::ZERO);

        limiter.wait_for_token(&cancel).await.unwrap();
        let waited = start.elapsed();
        // One token at 2/s is 500ms; allow +-20%.
        assert!(waited >= Duration::from_millis(400), "waited {:?}", waited);
        assert!(waited <= Duration::from_millis(600), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_consume_does_not_block() {
        let limiter = RateLimiter::with_config(RateLimitConfig::new(1.0, 1));
        assert!(limiter.try_consume());
        assert!(!limiter.try_consume());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_never_exceed_capacity() {
        let limiter = RateLimiter::with_config(RateLimitConfig::new(10.0, 4));
        assert!(limiter.try_consume());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(limiter.available_tokens(), 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_is_proportional_to_elapsed_time() {
        let limiter = RateLimiter::with_config(RateLimitConfig::new(4.0, 4));
        for _ in 0..4 {
            assert!(limiter.try_consume());
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(limiter.available_tokens(), 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_one_bucket() {
        let limiter = RateLimiter::with_config(RateLimitConfig::new(1.0, 2));
        let other = limiter.clone();
        assert!(limiter.try_consume());
        assert!(other.try_consume());
        assert!(!limiter.try_consume());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_burst_still_admits_requests() {
        let limiter = RateLimiter::with_config(RateLimitConfig::new(0.0, 0));
        let cancel = CancellationToken::new();
        assert_eq!(limiter.config().capacity, 1);

        let start = Instant::now();
        limiter.wait_for_token(&cancel).await.unwrap();
        limiter.wait_for_token(&cancel).await.unwrap();
        assert!(start.elapsed() <= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_is_cancellable() {
        let limiter = RateLimiter::with_config(RateLimitConfig::new(0.1, 1));
        let cancel = CancellationToken::new();
        limiter.wait_for_token(&cancel).await.unwrap();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let result = limiter.wait_for_token(&cancel).await;
        assert!(matches!(result, Err(RateLimitError::Cancelled)));
    }
}
