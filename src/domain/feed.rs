//! Feed records and the query vocabulary used to page through them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub const MIN_PAGE_LIMIT: u32 = 1;
pub const MAX_PAGE_LIMIT: u32 = 100;
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// A published feed entry. Produced by the ingestion pipeline and never mutated here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: i64,
    pub summary: String,
    pub tags: Vec<String>,
    pub channel: String,
    pub link: String,
    #[serde(with = "super::cursor::canonical")]
    pub published_at: OffsetDateTime,
    #[serde(with = "super::cursor::canonical")]
    pub created_at: OffsetDateTime,
}

/// Which side of the cursor a page is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Older items, newest first.
    Before,
    /// Newer items, oldest first.
    After,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Before => "before",
            Direction::After => "after",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// De-duplicated, lexicographically ordered tag filter.
///
/// Two filters built from the same tags in any order compare equal and iterate
/// identically, which is what cache fingerprints rely on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet(BTreeSet<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma-separated query value; entries are trimmed and blanks dropped.
    pub fn from_csv(raw: &str) -> Self {
        raw.split(',').collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: AsRef<str>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|tag| tag.as_ref().trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
        )
    }
}

/// Clamp a requested page size into `[MIN_PAGE_LIMIT, MAX_PAGE_LIMIT]`.
pub fn clamp_limit(requested: i64) -> u32 {
    requested.clamp(i64::from(MIN_PAGE_LIMIT), i64::from(MAX_PAGE_LIMIT)) as u32
}
