//! Result of one logical fetch (all attempts included).

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::FetchError;

/// Outcome of a fetch after retries. Built once and not mutated afterwards.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub success: bool,
    pub status_code: Option<u16>,
    pub body: Option<String>,
    pub error: Option<FetchError>,
    pub duration_ms: u64,
    /// Retries performed beyond the first attempt.
    pub retry_count: u32,
    pub url: String,
    /// When the logical fetch started.
    pub timestamp: DateTime<Utc>,
}

impl FetchResult {
    pub(crate) fn succeeded(
        url: String,
        status: u16,
        body: String,
        retry_count: u32,
        duration: Duration,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            success: true,
            status_code: Some(status),
            body: Some(body),
            error: None,
            duration_ms: duration.as_millis() as u64,
            retry_count,
            url,
            timestamp,
        }
    }

    pub(crate) fn failed(
        url: String,
        error: FetchError,
        retry_count: u32,
        duration: Duration,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            success: false,
            status_code: error.status_code(),
            body: None,
            error: Some(error),
            duration_ms: duration.as_millis() as u64,
            retry_count,
            url,
            timestamp,
        }
    }

    /// Check if the response indicates rate limiting (429 or 503).
    pub fn is_rate_limited(&self) -> bool {
        matches!(self.status_code, Some(429) | Some(503))
    }

    /// Consume the result, yielding the body or the terminal error.
    pub fn into_body(self) -> Result<String, FetchError> {
        match (self.success, self.body, self.error) {
            (true, Some(body), _) => Ok(body),
            (_, _, Some(error)) => Err(error),
            _ => Err(FetchError::Other("fetch produced no body".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_carries_status() {
        let result = FetchResult::failed(
            "https://shop.example/api".into(),
            FetchError::from_status(503, None),
            3,
            Duration::from_millis(120),
            Utc::now(),
        );
        assert!(!result.success);
        assert_eq!(result.status_code, Some(503));
        assert!(result.is_rate_limited());
        assert_eq!(result.retry_count, 3);
        assert_eq!(result.into_body(), Err(FetchError::from_status(503, None)));
    }

    #[test]
    fn test_succeeded_result_yields_body() {
        let result = FetchResult::succeeded(
            "https://shop.example/api".into(),
            200,
            "{}".into(),
            0,
            Duration::from_millis(5),
            Utc::now(),
        );
        assert_eq!(result.duration_ms, 5);
        assert_eq!(result.into_body(), Ok("{}".to_string()));
    }
}
