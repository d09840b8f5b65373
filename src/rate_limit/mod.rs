//! Rate limiting for outbound catalog requests.
//!
//! A token bucket caps the sustained request rate and allows a configurable
//! burst. One limiter may be shared between crawl sessions.

mod config;
mod limiter;

pub use config::RateLimitConfig;
pub use limiter::RateLimiter;

/// Errors from waiting on the rate limiter.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("wait for rate limit token was cancelled")]
    Cancelled,
}

/// Parse Retry-After header value (seconds).
/// Returns duration to wait, or None if header is missing/invalid.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<std::time::Duration> {
    let value = header_value?;
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| std::time::Duration::from_secs(secs.min(60)))
}
