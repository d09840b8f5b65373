//! Failure kinds for a single logical fetch.

use std::time::Duration;

/// Why a fetch failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// The per-attempt timeout elapsed before a response arrived.
    #[error("request timed out")]
    Timeout,
    /// DNS, connect, reset or other connection-level failure.
    #[error("network error: {0}")]
    Network(String),
    /// Upstream answered with a non-success status other than 429.
    #[error("HTTP {status}")]
    Http {
        status: u16,
        retry_after: Option<Duration>,
    },
    /// Upstream answered 429.
    #[error("rate limited by upstream (HTTP 429)")]
    RateLimitExceeded { retry_after: Option<Duration> },
    /// Pagination or item data in the body could not be interpreted.
    #[error("malformed page: {0}")]
    MalformedPage(String),
    /// The request target could not be built into a valid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    /// The session was cancelled while waiting or in flight.
    #[error("request cancelled")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Build the error for a non-success HTTP status.
    pub fn from_status(status: u16, retry_after: Option<Duration>) -> Self {
        if status == 429 {
            FetchError::RateLimitExceeded { retry_after }
        } else {
            FetchError::Http {
                status,
                retry_after,
            }
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            FetchError::RateLimitExceeded { .. } => Some(429),
            _ => None,
        }
    }

    /// Server-requested wait carried by this error, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::Http { retry_after, .. } | FetchError::RateLimitExceeded { retry_after } => {
                *retry_after
            }
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_connect() || e.is_request() {
            FetchError::Network(e.to_string())
        } else if e.is_builder() {
            FetchError::InvalidUrl(e.to_string())
        } else {
            FetchError::Other(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_429_maps_to_rate_limit() {
        let err = FetchError::from_status(429, Some(Duration::from_secs(3)));
        assert_eq!(
            err,
            FetchError::RateLimitExceeded {
                retry_after: Some(Duration::from_secs(3))
            }
        );
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_other_status_maps_to_http() {
        let err = FetchError::from_status(503, None);
        assert_eq!(err.status_code(), Some(503));
        assert_eq!(err.to_string(), "HTTP 503");
        assert_eq!(FetchError::Timeout.status_code(), None);
    }
}
