//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::feed::{Direction, FeedItem, TagSet};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
    #[error("database unavailable: {0}")]
    Unavailable(String),
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// One page request against the feed store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    pub direction: Direction,
    pub cursor: OffsetDateTime,
    pub tags: TagSet,
    pub limit: u32,
}

#[async_trait]
pub trait FeedItemsRepo: Send + Sync {
    /// Items strictly older (`Before`, newest first) or strictly newer (`After`,
    /// oldest first) than the cursor, restricted to items carrying at least one
    /// of the requested tags when any are given. Each item carries its full tag list.
    async fn query_feed(&self, query: &FeedQuery) -> Result<Vec<FeedItem>, RepoError>;

    async fn health_check(&self) -> Result<(), RepoError>;
}
