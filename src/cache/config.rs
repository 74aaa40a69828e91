//! Cache and invalidation-stream configuration.
//!
//! Both are derived from the validated `[cache]` and `[stream]` settings sections.

use std::time::Duration;

use serde::Deserialize;

use super::link::Backoff;

const DEFAULT_NAMESPACE: &str = "feedline:api:cache:";
const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_STREAM: &str = "feed-generation:new-feed";
const DEFAULT_GROUP: &str = "api-notifiers";
const DEFAULT_CONSUMER: &str = "api-worker-1";
const DEFAULT_BLOCK_TIMEOUT_MS: u64 = 5000;
const DEFAULT_IDLE_POLL_MS: u64 = 1000;
const DEFAULT_BACKOFF_STEP_MS: u64 = 100;
const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Which store holds cached responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Redis,
    Memory,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// When false every lookup misses and nothing is stored.
    pub enabled: bool,
    pub backend: CacheBackendKind,
    /// Prepended to every key the service writes.
    pub namespace: String,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackendKind::Redis,
            namespace: DEFAULT_NAMESPACE.to_string(),
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            backend: settings.backend,
            namespace: settings.namespace.clone(),
            ttl: settings.ttl,
        }
    }
}

/// Settings for the invalidation consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub stream: String,
    pub group: String,
    pub consumer: String,
    /// Upper bound of a single `XREADGROUP ... BLOCK` wait.
    pub block_timeout: Duration,
    /// Sleep between loop iterations while the link is down.
    pub idle_poll: Duration,
    pub backoff: Backoff,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            stream: DEFAULT_STREAM.to_string(),
            group: DEFAULT_GROUP.to_string(),
            consumer: DEFAULT_CONSUMER.to_string(),
            block_timeout: Duration::from_millis(DEFAULT_BLOCK_TIMEOUT_MS),
            idle_poll: Duration::from_millis(DEFAULT_IDLE_POLL_MS),
            backoff: Backoff::new(
                Duration::from_millis(DEFAULT_BACKOFF_STEP_MS),
                Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
            ),
        }
    }
}

impl From<&crate::config::StreamSettings> for ConsumerConfig {
    fn from(settings: &crate::config::StreamSettings) -> Self {
        Self {
            stream: settings.name.clone(),
            group: settings.group.clone(),
            consumer: settings.consumer.clone(),
            block_timeout: settings.block_timeout,
            idle_poll: settings.idle_poll,
            backoff: Backoff::new(settings.backoff_step, settings.backoff_max),
        }
    }
}
