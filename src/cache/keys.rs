//! Cache key definitions.
//!
//! A feed page is cached under a fingerprint of the query shape:
//!
//! ```text
//! feeds:{direction}:{canonical cursor}:{tags}:{limit}
//! ```
//!
//! `tags` is the sorted, de-duplicated tag set with each tag URL-form-encoded and the
//! results joined by `,`. Encoding keeps a literal `,` or `:` inside a tag from colliding
//! with the separators.

use std::fmt;

use url::form_urlencoded;

use crate::domain::{
    cursor::format_timestamp,
    error::DomainError,
    feed::{Direction, TagSet},
};
use crate::application::repos::FeedQuery;

/// Every feed page key starts with this. Invalidation evicts the whole prefix.
pub const FEEDS_PREFIX: &str = "feeds:";

/// Fingerprint of one feed query, relative to the cache namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedCacheKey(String);

impl FeedCacheKey {
    pub fn new(
        direction: Direction,
        cursor: time::OffsetDateTime,
        tags: &TagSet,
        limit: u32,
    ) -> Result<Self, DomainError> {
        let cursor = format_timestamp(cursor)?;
        Ok(Self(format!(
            "{FEEDS_PREFIX}{direction}:{cursor}:{tags}:{limit}",
            tags = encode_tags(tags),
        )))
    }

    pub fn for_query(query: &FeedQuery) -> Result<Self, DomainError> {
        Self::new(query.direction, query.cursor, &query.tags, query.limit)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn encode_tags(tags: &TagSet) -> String {
    tags.iter()
        .map(|tag| form_urlencoded::byte_serialize(tag.as_bytes()).collect::<String>())
        .collect::<Vec<_>>()
        .join(",")
}
