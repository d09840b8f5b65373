//! Shared fixtures: an in-memory upstream catalog behind the `Transport` seam.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use harvester::crawl::CrawlSession;
use harvester::discovery::{JsonPageExtractor, PageExtractor};
use harvester::http_client::{FetchAttempt, FetchError, HttpClient, Transport, TransportResponse};
use harvester::rate_limit::{RateLimitConfig, RateLimiter};
use harvester::retry::RetryConfig;

pub const BASE_URL: &str = "https://shop.example/api/";

/// Upstream serving `total` items with page-number pagination.
pub struct FakeCatalog {
    total: usize,
    id_for: Box<dyn Fn(usize) -> String + Send + Sync>,
    /// Page size actually served for a requested size.
    served_size: Box<dyn Fn(usize) -> usize + Send + Sync>,
    /// Statuses returned (in order) before normal service resumes.
    injected: Mutex<VecDeque<u16>>,
    offline: AtomicBool,
    requests: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn new(total: usize) -> Arc<Self> {
        Self::with_ids(total, |i| format!("item-{}", i))
    }

    pub fn with_ids(
        total: usize,
        id_for: impl Fn(usize) -> String + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::build(total, Box::new(id_for), Box::new(|requested| requested))
    }

    fn build(
        total: usize,
        id_for: Box<dyn Fn(usize) -> String + Send + Sync>,
        served_size: Box<dyn Fn(usize) -> usize + Send + Sync>,
    ) -> Arc<Self> {
        Arc::new(Self {
            total,
            id_for,
            served_size,
            injected: Mutex::new(VecDeque::new()),
            offline: AtomicBool::new(false),
            requests: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
        })
    }

    /// Upstream that decides its own page size, whatever is requested.
    pub fn serving(
        total: usize,
        served_size: impl Fn(usize) -> usize + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::build(total, Box::new(|i| format!("item-{}", i)), Box::new(served_size))
    }

    /// Answer the next `times` requests with `status`.
    pub fn fail_next(&self, status: u16, times: usize) {
        let mut injected = self.injected.lock().unwrap();
        injected.extend(std::iter::repeat(status).take(times));
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    fn page(&self, page: usize, requested: usize) -> TransportResponse {
        let page_size = (self.served_size)(requested).max(1);
        let offset = (page - 1) * page_size;
        let end = (offset + page_size).min(self.total);
        let items: Vec<_> = (offset.min(self.total)..end)
            .map(|i| json!({"id": (self.id_for)(i), "url": format!("/products/{}", i)}))
            .collect();
        TransportResponse::new(
            200,
            json!({
                "items": items,
                "pagination": {"offset": offset, "page_size": page_size, "total": self.total}
            })
            .to_string(),
        )
    }

    fn item(&self, id: &str) -> TransportResponse {
        match (0..self.total).find(|i| (self.id_for)(*i) == id) {
            Some(i) => TransportResponse::new(
                200,
                json!({"id": id, "position": i}).to_string(),
            ),
            None => TransportResponse::new(404, "{}"),
        }
    }
}

#[async_trait]
impl Transport for FakeCatalog {
    async fn execute(&self, attempt: &FetchAttempt) -> Result<TransportResponse, FetchError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(attempt.url.to_string());
        tokio::time::sleep(Duration::from_millis(10)).await;

        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Network("connection refused".into()));
        }
        if let Some(status) = self.injected.lock().unwrap().pop_front() {
            return Ok(TransportResponse::new(status, ""));
        }

        if let Some(id) = attempt.url.path().strip_prefix("/api/products/") {
            return Ok(self.item(id));
        }

        let param = |name: &str| {
            attempt
                .url
                .query_pairs()
                .find(|(k, _)| k == name)
                .and_then(|(_, v)| v.parse::<usize>().ok())
        };
        let page = param("page").unwrap_or(1).max(1);
        let page_size = param("page_size").unwrap_or(20).max(1);
        Ok(self.page(page, page_size))
    }
}

/// Client without jitter and with a generous limiter unless one is given.
pub fn client(transport: Arc<FakeCatalog>, limiter: Option<RateLimiter>) -> HttpClient {
    HttpClient::builder(BASE_URL, Duration::from_secs(5))
        .transport(transport)
        .rate_limiter(
            limiter.unwrap_or_else(|| RateLimiter::with_config(RateLimitConfig::new(1000.0, 1000))),
        )
        .retry(RetryConfig {
            jitter: false,
            ..RetryConfig::default()
        })
        .build()
        .unwrap()
}

pub fn extractor() -> Arc<dyn PageExtractor> {
    Arc::new(JsonPageExtractor::default())
}

pub fn session(transport: Arc<FakeCatalog>, page_size: u32) -> CrawlSession {
    CrawlSession::new(client(transport, None), extractor(), "products").with_page_size(page_size)
}
