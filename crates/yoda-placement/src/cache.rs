//! Write-through cache in front of catalog reads
//!
//! A [`CachedDataManager`] pairs a [`DataSource`] (the authoritative
//! original, usually catalog metadata) with a [`CacheBackend`]. Each
//! namespace carries one validity bit: entries are only served while the
//! namespace is valid.
//!
//! Failures of the original are surfaced. Failures of the cache are logged
//! and never reach the caller.

use crate::metrics::record_cache;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, warn};
use yoda_common::{Error, Result};

/// Storage for cached values, grouped by namespace
pub trait CacheBackend: Send + Sync {
    /// Fetch an entry
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;

    /// Store an entry
    fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()>;

    /// Whether entries of `namespace` may be served
    fn is_valid(&self, namespace: &str) -> Result<bool>;

    /// Set the validity bit of `namespace`
    fn set_valid(&self, namespace: &str, valid: bool) -> Result<()>;

    /// Drop every entry of `namespace`
    fn clear(&self, namespace: &str) -> Result<()>;
}

/// Process-local cache backend
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, HashMap<String, String>>>,
    valid: RwLock<HashSet<String>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held for `namespace`
    #[must_use]
    pub fn len(&self, namespace: &str) -> usize {
        self.entries.read().get(namespace).map_or(0, HashMap::len)
    }

    #[must_use]
    pub fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace) == 0
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .read()
            .get(namespace)
            .and_then(|ns| ns.get(key).cloned()))
    }

    fn set(&self, namespace: &str, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn is_valid(&self, namespace: &str) -> Result<bool> {
        Ok(self.valid.read().contains(namespace))
    }

    fn set_valid(&self, namespace: &str, valid: bool) -> Result<()> {
        let mut set = self.valid.write();
        if valid {
            set.insert(namespace.to_string());
        } else {
            set.remove(namespace);
        }
        Ok(())
    }

    fn clear(&self, namespace: &str) -> Result<()> {
        self.entries.write().remove(namespace);
        Ok(())
    }
}

/// The authoritative side of a cached namespace
#[async_trait]
pub trait DataSource: Send + Sync {
    type Key: fmt::Display + Send + Sync;
    type Value: Serialize + DeserializeOwned + Send + Sync;

    /// Namespace under which values are cached
    fn namespace(&self) -> &str;

    /// Read the authoritative value
    async fn get_original(&self, key: &Self::Key) -> Result<Self::Value>;

    /// Write the authoritative value
    async fn put_original(&self, key: &Self::Key, value: &Self::Value) -> Result<()>;

    /// Cache key for `key` in the caller's context
    fn context_string(&self, key: &Self::Key) -> String;

    /// Whether a miss stores the fetched value
    fn should_populate_on_get(&self) -> bool;
}

/// Cached access to a [`DataSource`]
pub struct CachedDataManager<S, C = MemoryCache> {
    source: S,
    cache: C,
}

impl<S: DataSource> CachedDataManager<S> {
    /// Manager with a fresh process-local cache
    #[must_use]
    pub fn new(source: S) -> Self {
        Self::with_backend(source, MemoryCache::new())
    }
}

impl<S: DataSource, C: CacheBackend> CachedDataManager<S, C> {
    pub const fn with_backend(source: S, cache: C) -> Self {
        Self { source, cache }
    }

    pub const fn source(&self) -> &S {
        &self.source
    }

    pub const fn cache(&self) -> &C {
        &self.cache
    }

    /// Cached value when the namespace is valid, the original otherwise
    pub async fn get(&self, key: &S::Key) -> Result<S::Value> {
        let namespace = self.source.namespace();
        let cache_key = self.source.context_string(key);

        match self.cached(namespace, &cache_key) {
            Ok(Some(value)) => {
                record_cache("hit");
                return Ok(value);
            }
            Ok(None) => record_cache("miss"),
            Err(e) => {
                record_cache("error");
                warn!(namespace, key = %cache_key, error = %e, "Cache read failed");
            }
        }

        let value = self.source.get_original(key).await?;
        if self.source.should_populate_on_get() {
            if let Err(e) = self.store(namespace, &cache_key, &value) {
                warn!(namespace, key = %cache_key, error = %e, "Cache populate failed");
            } else {
                debug!(namespace, key = %cache_key, "Cache populated");
            }
        }
        Ok(value)
    }

    /// Update the original, then the cache
    pub async fn put(&self, key: &S::Key, value: &S::Value) -> Result<()> {
        self.source.put_original(key, value).await?;
        let namespace = self.source.namespace();
        let cache_key = self.source.context_string(key);
        if let Err(e) = self.store(namespace, &cache_key, value) {
            warn!(namespace, key = %cache_key, error = %e, "Cache write failed");
            // The old entry would come back once another key revalidates the namespace
            self.invalidate();
        }
        Ok(())
    }

    /// Mark the namespace stale and drop its entries; the next `get` refetches
    pub fn invalidate(&self) {
        let namespace = self.source.namespace();
        let result = self
            .cache
            .set_valid(namespace, false)
            .and_then(|()| self.cache.clear(namespace));
        if let Err(e) = result {
            warn!(namespace, error = %e, "Cache invalidation failed");
        } else {
            debug!(namespace, "Cache invalidated");
        }
    }

    fn cached(&self, namespace: &str, cache_key: &str) -> Result<Option<S::Value>> {
        if !self.cache.is_valid(namespace)? {
            return Ok(None);
        }
        self.cache
            .get(namespace, cache_key)?
            .map(|raw| serde_json::from_str(&raw).map_err(|e| Error::Cache(e.to_string())))
            .transpose()
    }

    fn store(&self, namespace: &str, cache_key: &str, value: &S::Value) -> Result<()> {
        let raw = serde_json::to_string(value).map_err(|e| Error::Cache(e.to_string()))?;
        self.cache.set(namespace, cache_key, &raw)?;
        self.cache.set_valid(namespace, true)
    }
}
