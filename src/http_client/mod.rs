//! HTTP client for catalog pages.
//!
//! Every request is gated by the shared [`RateLimiter`] and governed by a
//! [`RetryPolicy`]. Both waits (token and backoff) and the in-flight request
//! observe the caller's cancellation token.

mod error;
mod history;
mod pagination;
mod response;
mod transport;
mod user_agent;

pub use error::FetchError;
pub use history::{RequestHistory, RequestRecord, RequestStats, DEFAULT_HISTORY_CAPACITY};
pub use pagination::{PaginationParams, PaginationStyle};
pub use response::FetchResult;
pub use transport::{FetchAttempt, ReqwestTransport, Transport, TransportResponse};
pub use user_agent::{UserAgentRotation, DEFAULT_USER_AGENTS};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::crawl::Cursor;
use crate::rate_limit::{parse_retry_after, RateLimiter};
use crate::retry::{classify, RetryConfig, RetryPolicy};

const ACCEPT: &str = "application/json, text/html;q=0.9, */*;q=0.8";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Per-call request options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Extra query parameters. Pagination parameters win on conflict.
    pub query: Vec<(String, String)>,
    /// Pagination position. `None` sends no pagination parameters.
    pub cursor: Option<Cursor>,
    /// Items per page; falls back to the client's pagination default.
    pub page_size: Option<u32>,
    /// Fixed User-Agent for this call, bypassing rotation.
    pub user_agent: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl FetchOptions {
    pub fn at(cursor: Cursor) -> Self {
        Self {
            cursor: Some(cursor),
            ..Self::default()
        }
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }
}

/// Rate-limited, retrying HTTP client.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    base_url: Url,
    timeout: Duration,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
    user_agents: Arc<UserAgentRotation>,
    pagination: PaginationParams,
    history: Arc<RequestHistory>,
}

/// Builder for constructing `HttpClient` with optional configuration.
///
/// The base URL and per-attempt timeout are provided via
/// `HttpClient::builder()`. Everything else is optional.
pub struct HttpClientBuilder {
    base_url: String,
    timeout: Duration,
    transport: Option<Arc<dyn Transport>>,
    rate_limiter: Option<RateLimiter>,
    retry: RetryConfig,
    user_agents: Vec<String>,
    pagination: PaginationParams,
    history_capacity: usize,
}

impl HttpClientBuilder {
    /// Replace the network layer (tests use a scripted transport).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set a shared rate limiter.
    /// Without this, the client gets its own limiter with default settings.
    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// User agents to rotate through. Empty means the built-in browser list.
    pub fn user_agents(mut self, agents: Vec<String>) -> Self {
        self.user_agents = agents;
        self
    }

    pub fn pagination(mut self, params: PaginationParams) -> Self {
        self.pagination = params;
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Build the `HttpClient`.
    ///
    /// # Errors
    /// Returns `InvalidUrl` if the base URL does not parse, or `Other` if the
    /// default reqwest client cannot be created.
    pub fn build(self) -> Result<HttpClient, FetchError> {
        let base_url = Url::parse(&self.base_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        Ok(HttpClient {
            transport,
            base_url,
            timeout: self.timeout,
            rate_limiter: self.rate_limiter.unwrap_or_default(),
            retry: RetryPolicy::new(self.retry),
            user_agents: Arc::new(UserAgentRotation::new(self.user_agents)),
            pagination: self.pagination,
            history: Arc::new(RequestHistory::new(self.history_capacity)),
        })
    }
}

impl HttpClient {
    /// Create a builder for constructing an `HttpClient`.
    pub fn builder(base_url: &str, timeout: Duration) -> HttpClientBuilder {
        HttpClientBuilder {
            base_url: base_url.to_string(),
            timeout,
            transport: None,
            rate_limiter: None,
            retry: RetryConfig::default(),
            user_agents: Vec::new(),
            pagination: PaginationParams::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn pagination(&self) -> &PaginationParams {
        &self.pagination
    }

    pub fn history(&self) -> &RequestHistory {
        &self.history
    }

    pub fn stats(&self) -> RequestStats {
        self.history.stats()
    }

    /// Resolve `target` against the base URL and apply query and pagination
    /// parameters. Parameters already present in `target` are replaced.
    pub fn build_url(&self, target: &str, options: &FetchOptions) -> Result<Url, FetchError> {
        let mut url = self
            .base_url
            .join(target)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", target, e)))?;

        let page_size = options.page_size.unwrap_or(self.pagination.page_size);
        let mut overrides = options.query.clone();
        overrides.extend(
            self.pagination
                .query_pairs(options.cursor.as_ref(), page_size),
        );

        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        for (name, value) in overrides {
            pairs.retain(|(k, _)| *k != name);
            pairs.push((name, value));
        }

        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }
        Ok(url)
    }

    fn request_headers(&self, options: &FetchOptions) -> Vec<(String, String)> {
        let user_agent = self.user_agents.resolve(options.user_agent.as_deref());
        let mut headers = vec![
            ("User-Agent".to_string(), user_agent.to_string()),
            ("Accept".to_string(), ACCEPT.to_string()),
            ("Accept-Language".to_string(), ACCEPT_LANGUAGE.to_string()),
        ];
        headers.extend(options.headers.iter().cloned());
        headers
    }

    /// Fetch `target` (absolute, or relative to the base URL), retrying
    /// transient failures. Never panics and never returns early without a
    /// result; every call is recorded in the request history.
    pub async fn fetch(
        &self,
        target: &str,
        options: &FetchOptions,
        cancel: &CancellationToken,
    ) -> FetchResult {
        let started = Instant::now();
        let timestamp = Utc::now();

        let url = match self.build_url(target, options) {
            Ok(url) => url,
            Err(error) => {
                let result =
                    FetchResult::failed(target.to_string(), error, 0, started.elapsed(), timestamp);
                self.history.record(&result);
                return result;
            }
        };
        let url_string = url.to_string();

        let mut attempt: u32 = 0;
        let result = loop {
            if self.rate_limiter.wait_for_token(cancel).await.is_err() {
                break FetchResult::failed(
                    url_string.clone(),
                    FetchError::Cancelled,
                    attempt,
                    started.elapsed(),
                    timestamp,
                );
            }

            let request = FetchAttempt {
                url: url.clone(),
                headers: self.request_headers(options),
                timeout: self.timeout,
                attempt,
            };
            debug!("GET {} (attempt {})", url_string, attempt + 1);

            let error = match self.execute_attempt(&request, cancel).await {
                Ok(response) => {
                    break FetchResult::succeeded(
                        url_string.clone(),
                        response.status,
                        response.body,
                        attempt,
                        started.elapsed(),
                        timestamp,
                    );
                }
                Err(error) => error,
            };

            if !self.retry.should_retry(&error, attempt) {
                if classify(&error).retry {
                    warn!(
                        "Giving up on {} after {} retries: {}",
                        url_string, attempt, error
                    );
                } else {
                    debug!("Not retrying {}: {}", url_string, error);
                }
                break FetchResult::failed(
                    url_string.clone(),
                    error,
                    attempt,
                    started.elapsed(),
                    timestamp,
                );
            }

            let next = attempt + 1;
            let delay = self.retry.delay_for(next, &error);
            debug!(
                "{} failed ({}), retry {}/{} in {:?}",
                url_string,
                error,
                next,
                self.retry.config().max_retries,
                delay
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    break FetchResult::failed(
                        url_string.clone(),
                        FetchError::Cancelled,
                        attempt,
                        started.elapsed(),
                        timestamp,
                    );
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt = next;
        };

        self.history.record(&result);
        result
    }

    /// One network attempt under the per-attempt timeout.
    async fn execute_attempt(
        &self,
        request: &FetchAttempt,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse, FetchError> {
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            outcome = tokio::time::timeout(request.timeout, self.transport.execute(request)) => {
                match outcome {
                    Ok(response) => response?,
                    Err(_) => return Err(FetchError::Timeout),
                }
            }
        };

        if response.is_success() {
            return Ok(response);
        }

        let retry_after = match response.status {
            429 | 503 => parse_retry_after(response.header("retry-after")),
            _ => None,
        };
        Err(FetchError::from_status(response.status, retry_after))
    }
}
