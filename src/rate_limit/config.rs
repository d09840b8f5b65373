//! Token bucket configuration.

use std::time::Duration;

use tracing::warn;

/// Configuration for the outbound request token bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum number of tokens the bucket holds (burst allowance).
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_rate_per_second: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            refill_rate_per_second: 2.0,
        }
    }
}

impl RateLimitConfig {
    /// Create a config from a sustained rate and a burst size.
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        Self {
            capacity: burst,
            refill_rate_per_second: requests_per_second,
        }
    }

    /// Bring out-of-range values back into range: at least one token of
    /// capacity and a positive, finite refill rate (the default otherwise).
    pub fn normalized(self) -> Self {
        let capacity = if self.capacity == 0 {
            warn!("Rate limit burst of 0 would never admit a request, using 1");
            1
        } else {
            self.capacity
        };
        let rate = self.refill_rate_per_second;
        let refill_rate_per_second = if rate > 0.0 && rate.is_finite() {
            rate
        } else {
            let fallback = Self::default().refill_rate_per_second;
            warn!(
                "Rate limit of {} requests/second is not usable, using {}",
                rate, fallback
            );
            fallback
        };
        Self {
            capacity,
            refill_rate_per_second,
        }
    }

    /// Time needed to accrue one token, rounded up to the millisecond.
    pub fn token_interval(&self) -> Duration {
        let millis = (1000.0 / self.refill_rate_per_second).ceil();
        Duration::from_millis(millis.max(1.0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_interval_rounds_up() {
        assert_eq!(
            RateLimitConfig::new(2.0, 1).token_interval(),
            Duration::from_millis(500)
        );
        assert_eq!(
            RateLimitConfig::new(3.0, 1).token_interval(),
            Duration::from_millis(334)
        );
    }

    #[test]
    fn normalized_rejects_unusable_values() {
        let config = RateLimitConfig::new(0.0, 0).normalized();
        assert_eq!(config.capacity, 1);
        assert_eq!(config.refill_rate_per_second, 2.0);

        assert_eq!(
            RateLimitConfig::new(-3.0, 4).normalized().refill_rate_per_second,
            2.0
        );
        assert_eq!(
            RateLimitConfig::new(f64::NAN, 4).normalized().refill_rate_per_second,
            2.0
        );
        assert_eq!(
            RateLimitConfig::new(0.5, 3).normalized(),
            RateLimitConfig::new(0.5, 3)
        );
    }
}
