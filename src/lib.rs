//! Catalog harvester.
//!
//! Pulls a large paginated catalog from an upstream that rate limits
//! informally and fails transiently, without re-processing records, and
//! serves the result through a cache-aside layer that degrades to stale data
//! when the upstream is unreachable.
//!
//! The pieces compose bottom-up:
//! [`rate_limit::RateLimiter`] and [`retry::RetryPolicy`] govern every request
//! made by [`http_client::HttpClient`]; [`crawl::CrawlSession`] walks the
//! collection page by page using [`discovery::PageDiscovery`]; progress can be
//! snapshotted and stored through [`checkpoint_store`]; and
//! [`cache::CatalogService`] puts a TTL cache in front of it all.

pub mod cache;
pub mod checkpoint_store;
pub mod config;
pub mod crawl;
pub mod discovery;
pub mod http_client;
pub mod models;
pub mod rate_limit;
pub mod retry;

pub use cache::{CacheStats, CatalogService, Lookup, LookupSource};
pub use config::{HarvestConfig, LoadOptions};
pub use crawl::{Checkpoint, CrawlError, CrawlSession, Cursor, IterationState};
pub use http_client::{FetchError, FetchResult, HttpClient};
pub use models::CatalogItem;
