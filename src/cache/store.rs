//! Pluggable storage for cache entries.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{CacheEntry, CacheError};

/// Key-value storage for cache entries.
///
/// `get` returns entries regardless of expiry; freshness is the caller's
/// decision so expired entries stay available as a stale fallback.
#[async_trait]
pub trait CacheStore<T>: Send + Sync
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<T>>, CacheError>;

    async fn set(&self, key: &str, entry: CacheEntry<T>) -> Result<(), CacheError>;

    /// Returns whether an entry was removed.
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;
}

/// Process-local store.
pub struct InMemoryCacheStore<T> {
    entries: RwLock<HashMap<String, CacheEntry<T>>>,
}

impl<T> InMemoryCacheStore<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for InMemoryCacheStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> CacheStore<T> for InMemoryCacheStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<CacheEntry<T>>, CacheError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, entry: CacheEntry<T>) -> Result<(), CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.remove(key).is_some())
    }
}
