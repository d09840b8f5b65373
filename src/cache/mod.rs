//! Cache-aside layer over the crawler.
//!
//! Entries carry an expiry; expired entries are refreshed on read but kept
//! as a fallback when the upstream is unreachable.

mod entry;
mod service;
mod store;

pub use entry::CacheEntry;
pub use service::{
    item_key, CacheStats, CatalogService, Lookup, LookupSource, RefreshError, COLLECTION_KEY,
};
pub use store::{CacheStore, InMemoryCacheStore};

/// Errors from cache store backends.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}
