//! Network seam for the HTTP client.
//!
//! The client drives retries, timeouts and rate limiting; a `Transport` only
//! performs one GET. `ReqwestTransport` is the production implementation.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use super::FetchError;

/// One network attempt.
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    /// Zero for the first attempt.
    pub attempt: u32,
}

impl FetchAttempt {
    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw upstream response, whatever its status.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Header value by name (names are stored lowercased).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|s| s.as_str())
    }
}

/// Performs a single GET. Non-success statuses are returned, not raised.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, attempt: &FetchAttempt) -> Result<TransportResponse, FetchError>;
}

fn extract_response_headers(response: &reqwest::Response) -> HashMap<String, String> {
    response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .gzip(true)
            .brotli(true)
            .cookie_store(true)
            .build()
            .map_err(|e| FetchError::Other(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, attempt: &FetchAttempt) -> Result<TransportResponse, FetchError> {
        let mut request = self
            .client
            .get(attempt.url.clone())
            .timeout(attempt.timeout);
        for (name, value) in &attempt.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = extract_response_headers(&response);
        let body = response.text().await?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
