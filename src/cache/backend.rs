//! Key-value store seam used by the response cache.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend is not ready")]
    NotReady,
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache payload codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl CacheError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Minimal string KV surface. Keys passed in are already fully namespaced.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// True while the underlying connection is usable. Checked before every operation.
    fn is_ready(&self) -> bool;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Every live key starting with `prefix`, enumerated without blocking the store.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, CacheError>;

    /// Delete the given keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> Result<u64, CacheError>;
}
