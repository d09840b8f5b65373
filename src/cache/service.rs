//! Cache-aside access to the harvested catalog.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CacheEntry, CacheStore, InMemoryCacheStore};
use crate::config::{ConfigError, HarvestConfig};
use crate::crawl::{Checkpoint, CrawlError, CrawlSession, IterationState};
use crate::discovery::{ExtractError, PageExtractor};
use crate::http_client::{FetchError, FetchOptions, HttpClient, RequestStats};
use crate::models::CatalogItem;

/// Cache key for the full collection.
pub const COLLECTION_KEY: &str = "catalog:all";

/// Cache key for a single item.
pub fn item_key(id: &str) -> String {
    format!("catalog:item:{}", CatalogItem::key_for(id))
}

/// Where a lookup's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupSource {
    /// Fresh cache entry, no network.
    Cache,
    /// Refreshed from upstream by this call.
    Refreshed,
    /// Another caller's concurrent refresh.
    Coalesced,
    /// Refresh failed; expired cached value.
    Stale,
    /// Refresh failed and nothing was cached.
    Missing,
}

impl LookupSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupSource::Cache => "cache",
            LookupSource::Refreshed => "refreshed",
            LookupSource::Coalesced => "coalesced",
            LookupSource::Stale => "stale",
            LookupSource::Missing => "missing",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Lookup<T> {
    pub value: Option<T>,
    pub source: LookupSource,
}

impl<T> Lookup<T> {
    fn new(value: T, source: LookupSource) -> Self {
        Self {
            value: Some(value),
            source,
        }
    }

    fn missing() -> Self {
        Self {
            value: None,
            source: LookupSource::Missing,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.source, LookupSource::Stale | LookupSource::Missing)
    }
}

/// Why a refresh could not produce a value. Never surfaced to callers of
/// the cache; logged and counted instead.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Crawl(#[from] CrawlError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("item '{0}' not found upstream")]
    NotFound(String),
}

/// Counters describing cache behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
    pub stale_fallbacks: u64,
    pub coalesced: u64,
}

#[derive(Default)]
struct StatsCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    refreshes: AtomicU64,
    refresh_failures: AtomicU64,
    stale_fallbacks: AtomicU64,
    coalesced: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            stale_fallbacks: self.stale_fallbacks.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

/// In-flight refresh slot for one key.
///
/// `generation` increments after every finished refresh; a caller that saw
/// it change while waiting for `refresh` reuses that result.
#[derive(Default)]
struct RefreshSlot {
    refresh: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    last_ok: AtomicBool,
}

/// Cache-aside catalog access.
///
/// Fresh entries are served without touching the network. Misses, expired
/// entries and forced refreshes go upstream; when that fails the last cached
/// value is served regardless of age. Concurrent refreshes of one key are
/// coalesced.
pub struct CatalogService {
    session: tokio::sync::Mutex<CrawlSession>,
    client: HttpClient,
    extractor: Arc<dyn PageExtractor>,
    item_path: String,
    collections: Arc<dyn CacheStore<Vec<CatalogItem>>>,
    items: Arc<dyn CacheStore<CatalogItem>>,
    ttl: Duration,
    inflight: Mutex<HashMap<String, Arc<RefreshSlot>>>,
    stats: StatsCounters,
    cancel: CancellationToken,
}

impl CatalogService {
    /// `item_path` is a URL template where `{id}` is replaced by the
    /// (percent-encoded) item identifier.
    pub fn new(
        session: CrawlSession,
        extractor: Arc<dyn PageExtractor>,
        item_path: &str,
        ttl: Duration,
    ) -> Self {
        let client = session.client().clone();
        Self {
            session: tokio::sync::Mutex::new(session),
            client,
            extractor,
            item_path: item_path.to_string(),
            collections: Arc::new(InMemoryCacheStore::new()),
            items: Arc::new(InMemoryCacheStore::new()),
            ttl,
            inflight: Mutex::new(HashMap::new()),
            stats: StatsCounters::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Build the whole stack (limiter, client, extractor, session) from config.
    pub fn from_config(config: &HarvestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let client = config.build_client()?;
        let extractor = config.build_extractor();
        let session = CrawlSession::new(client, extractor.clone(), &config.collection_path)
            .with_max_pages(config.max_pages);
        Ok(Self::new(
            session,
            extractor,
            &config.item_path,
            config.cache_ttl(),
        ))
    }

    pub fn with_stores(
        mut self,
        collections: Arc<dyn CacheStore<Vec<CatalogItem>>>,
        items: Arc<dyn CacheStore<CatalogItem>>,
    ) -> Self {
        self.collections = collections;
        self.items = items;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    pub fn request_stats(&self) -> RequestStats {
        self.client.stats()
    }

    /// Token observed by every fetch this service makes.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel in-flight and future upstream requests. Cached values remain
    /// readable.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Full collection, refreshing when missing, expired or `force_refresh`.
    /// Empty when nothing could be fetched or cached.
    pub async fn fetch_collection(&self, force_refresh: bool) -> Vec<CatalogItem> {
        self.lookup_collection(force_refresh)
            .await
            .value
            .unwrap_or_default()
    }

    /// One item, refreshing when missing, expired or `force_refresh`.
    pub async fn fetch_one(&self, id: &str, force_refresh: bool) -> Option<CatalogItem> {
        self.lookup_item(id, force_refresh).await.value
    }

    pub async fn lookup_collection(&self, force_refresh: bool) -> Lookup<Vec<CatalogItem>> {
        self.get_or_refresh(
            self.collections.as_ref(),
            COLLECTION_KEY,
            force_refresh,
            || self.refresh_collection(),
        )
        .await
    }

    pub async fn lookup_item(&self, id: &str, force_refresh: bool) -> Lookup<CatalogItem> {
        let key = item_key(id);
        self.get_or_refresh(self.items.as_ref(), &key, force_refresh, || {
            self.refresh_item(id)
        })
        .await
    }

    pub async fn create_checkpoint(&self) -> Checkpoint {
        self.session.lock().await.create_checkpoint()
    }

    pub async fn restore_checkpoint(&self, checkpoint: &Checkpoint) {
        self.session.lock().await.restore_checkpoint(checkpoint);
    }

    pub async fn iteration_state(&self) -> IterationState {
        self.session.lock().await.state().clone()
    }

    async fn get_or_refresh<T, F, Fut>(
        &self,
        store: &dyn CacheStore<T>,
        key: &str,
        force_refresh: bool,
        refresh: F,
    ) -> Lookup<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RefreshError>>,
    {
        if !force_refresh {
            if let Some(entry) = read(store, key).await.filter(CacheEntry::is_fresh) {
                StatsCounters::bump(&self.stats.hits);
                debug!("Cache hit for '{}'", key);
                return Lookup::new(entry.value, LookupSource::Cache);
            }
            StatsCounters::bump(&self.stats.misses);
        }

        let slot = self.slot(key);
        let seen = slot.generation.load(Ordering::Acquire);
        let guard = slot.refresh.lock().await;

        let lookup = if slot.generation.load(Ordering::Acquire) != seen {
            StatsCounters::bump(&self.stats.coalesced);
            debug!("Reusing concurrent refresh of '{}'", key);
            let source = if slot.last_ok.load(Ordering::Acquire) {
                LookupSource::Coalesced
            } else {
                LookupSource::Stale
            };
            match read(store, key).await {
                Some(entry) => Lookup::new(entry.value, source),
                None => Lookup::missing(),
            }
        } else {
            let lookup = self.refresh_into(store, key, refresh).await;
            slot.last_ok
                .store(lookup.source == LookupSource::Refreshed, Ordering::Release);
            slot.generation.fetch_add(1, Ordering::Release);
            lookup
        };

        drop(guard);
        self.release_slot(key, &slot);
        lookup
    }

    async fn refresh_into<T, F, Fut>(
        &self,
        store: &dyn CacheStore<T>,
        key: &str,
        refresh: F,
    ) -> Lookup<T>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RefreshError>>,
    {
        StatsCounters::bump(&self.stats.refreshes);
        match refresh().await {
            Ok(value) => {
                write(store, key, CacheEntry::new(value.clone(), self.ttl)).await;
                debug!("Refreshed '{}'", key);
                Lookup::new(value, LookupSource::Refreshed)
            }
            Err(e) => {
                StatsCounters::bump(&self.stats.refresh_failures);
                match read(store, key).await {
                    Some(entry) => {
                        StatsCounters::bump(&self.stats.stale_fallbacks);
                        warn!(
                            "Refresh of '{}' failed ({}), serving cached value from {}s ago",
                            key,
                            e,
                            entry.age().as_secs()
                        );
                        Lookup::new(entry.value, LookupSource::Stale)
                    }
                    None => {
                        warn!(
                            "Refresh of '{}' failed ({}) and nothing is cached",
                            key, e
                        );
                        Lookup::missing()
                    }
                }
            }
        }
    }

    fn slot(&self, key: &str) -> Arc<RefreshSlot> {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        inflight.entry(key.to_string()).or_default().clone()
    }

    /// Drop the slot once nobody else holds it.
    fn release_slot(&self, key: &str, slot: &Arc<RefreshSlot>) {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        if Arc::strong_count(slot) <= 2 {
            inflight.remove(key);
        }
    }

    async fn refresh_collection(&self) -> Result<Vec<CatalogItem>, RefreshError> {
        let mut session = self.session.lock().await;
        if session.is_complete() {
            session.reset();
        }
        let resumed = session.state().is_started();

        let pages = session.run(&self.cancel).await?;
        let harvested = session.take_harvested();
        drop(session);

        let items = if resumed {
            let previous = read(self.collections.as_ref(), COLLECTION_KEY)
                .await
                .map(|entry| entry.value)
                .unwrap_or_default();
            merge_collections(previous, harvested)
        } else {
            harvested
        };

        for item in &items {
            write(
                self.items.as_ref(),
                &item_key(&item.id),
                CacheEntry::new(item.clone(), self.ttl),
            )
            .await;
        }

        info!(
            "Collection refreshed: {} items over {} pages{}",
            items.len(),
            pages,
            if resumed { " (resumed)" } else { "" }
        );
        Ok(items)
    }

    async fn refresh_item(&self, id: &str) -> Result<CatalogItem, RefreshError> {
        let target = self.item_path.replace("{id}", &urlencoding::encode(id));
        let body = self
            .client
            .fetch(&target, &FetchOptions::default(), &self.cancel)
            .await
            .into_body()?;
        let item = self
            .extractor
            .extract_item(&body)?
            .ok_or_else(|| RefreshError::NotFound(id.to_string()))?;

        self.upsert_into_collection(&item).await;
        Ok(item)
    }

    /// Replace any same-id element of the cached collection, keeping its expiry.
    ///
    /// Runs under the collection's refresh slot so concurrent upserts and
    /// collection refreshes never overwrite each other.
    async fn upsert_into_collection(&self, item: &CatalogItem) {
        let slot = self.slot(COLLECTION_KEY);
        let guard = slot.refresh.lock().await;

        if let Some(entry) = read(self.collections.as_ref(), COLLECTION_KEY).await {
            let key = item.dedup_key();
            let mut collection = entry.value.clone();
            collection.retain(|existing| existing.dedup_key() != key);
            collection.push(item.clone());
            write(
                self.collections.as_ref(),
                COLLECTION_KEY,
                entry.with_value(collection),
            )
            .await;
        }

        drop(guard);
        self.release_slot(COLLECTION_KEY, &slot);
    }
}

/// Previously cached items first, then freshly crawled ones; fresh wins on
/// duplicate ids.
fn merge_collections(previous: Vec<CatalogItem>, fresh: Vec<CatalogItem>) -> Vec<CatalogItem> {
    let fresh_keys: HashSet<String> = fresh.iter().map(CatalogItem::dedup_key).collect();
    previous
        .into_iter()
        .filter(|item| !fresh_keys.contains(&item.dedup_key()))
        .chain(fresh)
        .collect()
}

async fn read<T>(store: &dyn CacheStore<T>, key: &str) -> Option<CacheEntry<T>>
where
    T: Clone + Send + Sync + 'static,
{
    match store.get(key).await {
        Ok(entry) => entry,
        Err(e) => {
            warn!("Cache read for '{}' failed: {}", key, e);
            None
        }
    }
}

async fn write<T>(store: &dyn CacheStore<T>, key: &str, entry: CacheEntry<T>)
where
    T: Clone + Send + Sync + 'static,
{
    if let Err(e) = store.set(key, entry).await {
        warn!("Cache write for '{}' failed: {}", key, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheError;
    use crate::discovery::JsonPageExtractor;
    use crate::http_client::{FetchAttempt, Transport, TransportResponse};
    use crate::rate_limit::{RateLimitConfig, RateLimiter};
    use crate::retry::RetryConfig;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Serves a fixed catalog, optionally failing every request.
    struct Catalog {
        items: Vec<&'static str>,
        failing: AtomicBool,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl Catalog {
        fn new(items: Vec<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                items,
                failing: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
                delay: Duration::from_millis(50),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for Catalog {
        async fn execute(&self, attempt: &FetchAttempt) -> Result<TransportResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.failing.load(Ordering::SeqCst) {
                return Ok(TransportResponse::new(503, ""));
            }

            let path = attempt.url.path();
            if let Some(id) = path.strip_prefix("/products/") {
                return Ok(match self.items.iter().find(|i| **i == id) {
                    Some(id) => TransportResponse::new(
                        200,
                        json!({"id": id, "name": format!("updated {}", id)}).to_string(),
                    ),
                    None => TransportResponse::new(404, ""),
                });
            }

            let items: Vec<_> = self.items.iter().map(|id| json!({ "id": id })).collect();
            Ok(TransportResponse::new(
                200,
                json!({
                    "items": items,
                    "pagination": {"offset": 0, "total": self.items.len()}
                })
                .to_string(),
            ))
        }
    }

    fn service(transport: Arc<Catalog>) -> CatalogService {
        let client = HttpClient::builder("https://shop.example/", Duration::from_secs(5))
            .transport(transport)
            .rate_limiter(RateLimiter::with_config(RateLimitConfig::new(100.0, 100)))
            .retry(RetryConfig {
                max_retries: 1,
                jitter: false,
                ..RetryConfig::default()
            })
            .build()
            .unwrap();
        let extractor: Arc<dyn PageExtractor> = Arc::new(JsonPageExtractor::default());
        let session = CrawlSession::new(client, extractor.clone(), "products");
        CatalogService::new(session, extractor, "products/{id}", Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_collection_is_served_from_cache() {
        let transport = Catalog::new(vec!["a", "b"]);
        let service = service(transport.clone());

        let first = service.lookup_collection(false).await;
        assert_eq!(first.source, LookupSource::Refreshed);
        let calls = transport.calls();

        let second = service.lookup_collection(false).await;
        assert_eq!(second.source, LookupSource::Cache);
        assert_eq!(second.value, first.value);
        assert_eq!(transport.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refreshed() {
        let transport = Catalog::new(vec!["a"]);
        let service = service(transport.clone());

        service.fetch_collection(false).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        let lookup = service.lookup_collection(false).await;
        assert_eq!(lookup.source, LookupSource::Refreshed);
        assert_eq!(service.stats().refreshes, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_serves_stale_value() {
        let transport = Catalog::new(vec!["a", "b"]);
        let service = service(transport.clone());

        let cached = service.fetch_collection(false).await;
        transport.failing.store(true, Ordering::SeqCst);

        let lookup = service.lookup_collection(true).await;
        assert_eq!(lookup.source, LookupSource::Stale);
        assert_eq!(lookup.value, Some(cached));
        assert_eq!(service.stats().stale_fallbacks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_without_cache_is_empty() {
        let transport = Catalog::new(vec!["a"]);
        transport.failing.store(true, Ordering::SeqCst);
        let service = service(transport);

        assert!(service.fetch_collection(false).await.is_empty());
        assert_eq!(service.fetch_one("a", false).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collection_crawl_populates_items() {
        let transport = Catalog::new(vec!["a", "B"]);
        let service = service(transport.clone());

        service.fetch_collection(false).await;
        let calls = transport.calls();

        let lookup = service.lookup_item("b", false).await;
        assert_eq!(lookup.source, LookupSource::Cache);
        assert_eq!(lookup.value.unwrap().id, "B");
        assert_eq!(transport.calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_refresh_updates_collection() {
        let transport = Catalog::new(vec!["a", "b"]);
        let service = service(transport);

        service.fetch_collection(false).await;
        let item = service.fetch_one("a", true).await.unwrap();
        assert_eq!(item.field_str("name"), Some("updated a"));

        let collection = service.fetch_collection(false).await;
        let ids: Vec<&str> = collection.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(
            collection[1].field_str("name"),
            Some("updated a"),
            "collection holds the refreshed item"
        );
    }

    /// In-memory store whose reads take a while, so read-modify-write
    /// sequences interleave.
    struct SlowReads<T> {
        inner: InMemoryCacheStore<T>,
    }

    #[async_trait]
    impl<T> CacheStore<T> for SlowReads<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        async fn get(&self, key: &str) -> Result<Option<CacheEntry<T>>, CacheError> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, entry: CacheEntry<T>) -> Result<(), CacheError> {
            self.inner.set(key, entry).await
        }

        async fn remove(&self, key: &str) -> Result<bool, CacheError> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_item_refreshes_keep_both_updates() {
        let transport = Catalog::new(vec!["a", "b", "c"]);
        let service = service(transport).with_stores(
            Arc::new(SlowReads {
                inner: InMemoryCacheStore::new(),
            }),
            Arc::new(InMemoryCacheStore::new()),
        );
        service.fetch_collection(false).await;

        let (a, b) = tokio::join!(service.fetch_one("a", true), service.fetch_one("b", true));
        assert!(a.is_some() && b.is_some());

        let collection = service.fetch_collection(false).await;
        assert_eq!(collection.len(), 3);
        for id in ["a", "b"] {
            let item = collection.iter().find(|item| item.id == id).unwrap();
            assert_eq!(
                item.field_str("name"),
                Some(format!("updated {}", id).as_str())
            );
        }
        assert_eq!(collection[0].id, "c");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_refreshes_are_coalesced() {
        let transport = Catalog::new(vec!["a"]);
        let service = Arc::new(service(transport.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                tokio::spawn(async move { service.lookup_item("a", false).await })
            })
            .collect();

        let mut sources = Vec::new();
        for task in tasks {
            let lookup = task.await.unwrap();
            assert_eq!(lookup.value.unwrap().id, "a");
            sources.push(lookup.source);
        }

        assert_eq!(transport.calls(), 1);
        assert_eq!(
            sources
                .iter()
                .filter(|s| **s == LookupSource::Refreshed)
                .count(),
            1
        );
        assert_eq!(service.stats().coalesced, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_item_is_missing() {
        let transport = Catalog::new(vec!["a"]);
        let service = service(transport);

        let lookup = service.lookup_item("zzz", false).await;
        assert_eq!(lookup.source, LookupSource::Missing);
        assert!(lookup.is_degraded());
    }

    #[test]
    fn test_merge_prefers_fresh_items() {
        let previous = vec![
            CatalogItem::new("a"),
            CatalogItem::new("b").with_fields(json!({"v": 1})),
        ];
        let fresh = vec![
            CatalogItem::new("B").with_fields(json!({"v": 2})),
            CatalogItem::new("c"),
        ];
        let merged = merge_collections(previous, fresh);
        let ids: Vec<&str> = merged.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "B", "c"]);
    }
}
