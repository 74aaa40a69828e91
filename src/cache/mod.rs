//! Feed response cache and its invalidation pipeline.
//!
//! - [`ResponseCache`] maps a query fingerprint ([`FeedCacheKey`]) to a serialized page
//!   with a TTL, on top of any [`CacheBackend`]. It never fails a request: an unreachable
//!   backend turns it into a pass-through.
//! - [`InvalidationConsumer`] follows an [`EventLog`] consumer group and evicts every
//!   feed page whenever a change notification arrives.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "redis"          # or "memory"
//! namespace = "feedline:api:cache:"
//! ttl_seconds = 300
//!
//! [stream]
//! name = "feed-generation:new-feed"
//! group = "api-notifiers"
//! consumer = "api-worker-1"
//! ```

mod backend;
mod config;
mod consumer;
mod events;
mod keys;
mod link;
mod memory;
mod store;

pub use backend::{CacheBackend, CacheError};
pub use config::{CacheBackendKind, CacheConfig, ConsumerConfig};
pub use consumer::{
    ConsumerStatus, InvalidationConsumer, READ_REPLY_GRACE, STREAM_MESSAGES_TOTAL,
    STREAM_RECONNECT_TOTAL,
};
pub use events::{EventLog, GroupCreation, StreamEntry, StreamError};
pub use keys::{FEEDS_PREFIX, FeedCacheKey};
pub use link::{Backoff, ConnectionState, Link};
pub use memory::MemoryCacheBackend;
pub use store::{
    CACHE_EVICTED_KEYS_TOTAL, CACHE_HIT_TOTAL, CACHE_MISS_TOTAL, CacheLookup, EvictOutcome,
    ResponseCache,
};
