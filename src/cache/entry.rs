//! Cached value with expiry.

use std::time::Duration;

use tokio::time::Instant;

/// A cached value and when it stops being fresh.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub stored_at: Instant,
    pub expires_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            stored_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }

    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    /// Same expiry, different value.
    pub fn with_value<U>(&self, value: U) -> CacheEntry<U> {
        CacheEntry {
            value,
            stored_at: self.stored_at,
            expires_at: self.expires_at,
        }
    }
}
