//! Read-through response cache that degrades to a no-op.
//!
//! Nothing here returns an error. Backend failures, an unready connection and
//! undecodable payloads are logged and folded into [`CacheLookup::Miss`],
//! a silent skip on write, or [`EvictOutcome`].

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::backend::{CacheBackend, CacheError};
use super::config::CacheConfig;
use super::keys::FeedCacheKey;

const SOURCE: &str = "cache::store";

pub const CACHE_HIT_TOTAL: &str = "feedline_cache_hit_total";
pub const CACHE_MISS_TOTAL: &str = "feedline_cache_miss_total";
pub const CACHE_EVICTED_KEYS_TOTAL: &str = "feedline_cache_evicted_keys_total";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
}

impl<T> CacheLookup<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            CacheLookup::Hit(value) => Some(value),
            CacheLookup::Miss => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }
}

/// Result of a prefix eviction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictOutcome {
    /// Number of keys removed, possibly zero.
    Evicted(u64),
    /// Backend was not ready or caching is disabled; nothing was attempted.
    Skipped,
    /// Enumeration or deletion failed part way.
    Failed(String),
}

#[derive(Clone)]
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
    namespace: Arc<str>,
    ttl: Duration,
    enabled: bool,
}

impl ResponseCache {
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        Self {
            backend,
            namespace: Arc::from(config.namespace.as_str()),
            ttl: config.ttl,
            enabled: config.enabled,
        }
    }

    pub fn is_available(&self) -> bool {
        self.enabled && self.backend.is_ready()
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{key}", self.namespace)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &FeedCacheKey) -> CacheLookup<T> {
        if !self.is_available() {
            counter!(CACHE_MISS_TOTAL).increment(1);
            return CacheLookup::Miss;
        }

        let full_key = self.namespaced(key.as_str());
        let lookup = match self.backend.get(&full_key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => CacheLookup::Hit(value),
                Err(err) => {
                    warn!(
                        target = SOURCE,
                        key = %full_key,
                        error = %CacheError::from(err),
                        "discarding undecodable cache entry"
                    );
                    CacheLookup::Miss
                }
            },
            Ok(None) => CacheLookup::Miss,
            Err(err) => {
                warn!(target = SOURCE, key = %full_key, error = %err, "cache read failed");
                CacheLookup::Miss
            }
        };

        if lookup.is_hit() {
            counter!(CACHE_HIT_TOTAL).increment(1);
            debug!(target = SOURCE, key = %full_key, "cache hit");
        } else {
            counter!(CACHE_MISS_TOTAL).increment(1);
            debug!(target = SOURCE, key = %full_key, "cache miss");
        }
        lookup
    }

    /// Store with the configured TTL.
    pub async fn set<T: Serialize>(&self, key: &FeedCacheKey, value: &T) {
        self.set_with_ttl(key, value, self.ttl).await;
    }

    async fn set_with_ttl<T: Serialize>(&self, key: &FeedCacheKey, value: &T, ttl: Duration) {
        if !self.is_available() {
            return;
        }

        let full_key = self.namespaced(key.as_str());
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(target = SOURCE, key = %full_key, error = %err, "cache payload not serializable");
                return;
            }
        };

        if let Err(err) = self.backend.set_ex(&full_key, &payload, ttl).await {
            warn!(target = SOURCE, key = %full_key, error = %err, "cache write failed");
        }
    }

    /// Remove every entry whose key (relative to the namespace) starts with `prefix`.
    pub async fn evict_prefix(&self, prefix: &str) -> EvictOutcome {
        if !self.is_available() {
            debug!(target = SOURCE, prefix, "cache unavailable; eviction skipped");
            return EvictOutcome::Skipped;
        }

        let full_prefix = self.namespaced(prefix);
        let keys = match self.backend.keys_with_prefix(&full_prefix).await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(target = SOURCE, prefix = %full_prefix, error = %err, "cache key enumeration failed");
                return EvictOutcome::Failed(err.to_string());
            }
        };

        if keys.is_empty() {
            debug!(target = SOURCE, prefix = %full_prefix, "no cache entries to evict");
            return EvictOutcome::Evicted(0);
        }

        match self.backend.del(&keys).await {
            Ok(removed) => {
                counter!(CACHE_EVICTED_KEYS_TOTAL).increment(removed);
                debug!(target = SOURCE, prefix = %full_prefix, removed, "cache entries evicted");
                EvictOutcome::Evicted(removed)
            }
            Err(err) => {
                warn!(target = SOURCE, prefix = %full_prefix, error = %err, "cache delete failed");
                EvictOutcome::Failed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;
    use crate::cache::memory::MemoryCacheBackend;
    use crate::domain::feed::{Direction, TagSet};

    fn key(limit: u32) -> FeedCacheKey {
        FeedCacheKey::new(
            Direction::Before,
            datetime!(2025-01-14 00:00:00 UTC),
            &TagSet::new(),
            limit,
        )
        .expect("key")
    }

    fn cache(backend: Arc<MemoryCacheBackend>, enabled: bool) -> ResponseCache {
        ResponseCache::new(
            backend,
            &CacheConfig {
                enabled,
                ..CacheConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn stores_under_namespace() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let cache = cache(backend.clone(), true);

        cache.set(&key(20), &vec![1, 2, 3]).await;

        let raw = backend
            .get("feedline:api:cache:feeds:before:2025-01-14T00:00:00Z::20")
            .await
            .expect("get");
        assert_eq!(raw.as_deref(), Some("[1,2,3]"));
        assert_eq!(cache.get::<Vec<i32>>(&key(20)).await, CacheLookup::Hit(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let cache = cache(backend.clone(), true);
        backend
            .set_ex(
                "feedline:api:cache:feeds:before:2025-01-14T00:00:00Z::20",
                "{not json",
                Duration::from_secs(60),
            )
            .await
            .expect("seed");

        assert_eq!(cache.get::<Vec<i32>>(&key(20)).await, CacheLookup::Miss);
    }

    #[tokio::test]
    async fn disabled_cache_is_inert() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let cache = cache(backend.clone(), false);

        cache.set(&key(20), &1).await;
        assert!(backend.is_empty());
        assert_eq!(cache.get::<i32>(&key(20)).await, CacheLookup::Miss);
        assert_eq!(cache.evict_prefix("feeds:").await, EvictOutcome::Skipped);
    }

    #[tokio::test]
    async fn eviction_is_idempotent() {
        let backend = Arc::new(MemoryCacheBackend::new());
        let cache = cache(backend.clone(), true);
        cache.set(&key(20), &1).await;
        cache.set(&key(50), &2).await;

        assert_eq!(cache.evict_prefix("feeds:").await, EvictOutcome::Evicted(2));
        assert_eq!(cache.evict_prefix("feeds:").await, EvictOutcome::Evicted(0));
    }
}
