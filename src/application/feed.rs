use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::application::repos::{FeedItemsRepo, FeedQuery, RepoError};
use crate::cache::{CacheLookup, FeedCacheKey, ResponseCache};
use crate::domain::cursor::{Cursor, format_timestamp};
use crate::domain::error::DomainError;
use crate::domain::feed::{Direction, FeedItem, TagSet, clamp_limit};

const SOURCE: &str = "application::feed";

pub const FEED_QUERY_MS: &str = "feedline_feed_query_ms";

/// A single page of feed items plus the cursor to continue from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedPage {
    pub feeds: Vec<FeedItem>,
    pub count: usize,
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FeedRequest {
    pub direction: Direction,
    pub cursor: Cursor,
    pub tags: TagSet,
    /// Raw requested size; clamped into range before use.
    pub limit: i64,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct FeedService {
    repo: Arc<dyn FeedItemsRepo>,
    cache: ResponseCache,
}

impl FeedService {
    pub fn new(repo: Arc<dyn FeedItemsRepo>, cache: ResponseCache) -> Self {
        Self { repo, cache }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub async fn get_page(&self, request: FeedRequest) -> Result<FeedPage, FeedError> {
        let query = FeedQuery {
            direction: request.direction,
            cursor: request.cursor.at(),
            tags: request.tags,
            limit: clamp_limit(request.limit),
        };
        let key = FeedCacheKey::for_query(&query)?;

        if let CacheLookup::Hit(mut page) = self.cache.get::<FeedPage>(&key).await {
            // Equivalent cursor spellings share a key; the echo must be this client's text.
            if page.feeds.is_empty() && query.direction == Direction::After {
                page.next_cursor = Some(request.cursor.raw().to_string());
            }
            return Ok(page);
        }

        let started_at = Instant::now();
        let items = self.repo.query_feed(&query).await?;
        histogram!(FEED_QUERY_MS, "direction" => query.direction.as_str())
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        let next_cursor = match items.last() {
            Some(last) => Some(format_timestamp(last.created_at)?),
            None => match query.direction {
                Direction::Before => None,
                // No newer items yet: hand the same cursor back so pollers can retry it.
                Direction::After => Some(request.cursor.raw().to_string()),
            },
        };

        let page = FeedPage {
            count: items.len(),
            feeds: items,
            next_cursor,
        };

        debug!(
            target = SOURCE,
            key = %key,
            count = page.count,
            "feed page loaded from store"
        );
        self.cache.set(&key, &page).await;
        Ok(page)
    }

    pub async fn store_health(&self) -> Result<(), RepoError> {
        self.repo.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use time::macros::datetime;

    use super::*;
    use crate::cache::{CacheConfig, MemoryCacheBackend};

    #[derive(Default)]
    struct RecordingRepo {
        items: Vec<FeedItem>,
        queries: Mutex<Vec<FeedQuery>>,
    }

    #[async_trait]
    impl FeedItemsRepo for RecordingRepo {
        async fn query_feed(&self, query: &FeedQuery) -> Result<Vec<FeedItem>, RepoError> {
            self.queries.lock().expect("lock").push(query.clone());
            Ok(self.items.clone())
        }

        async fn health_check(&self) -> Result<(), RepoError> {
            Ok(())
        }
    }

    fn service(repo: Arc<RecordingRepo>) -> FeedService {
        let cache = ResponseCache::new(Arc::new(MemoryCacheBackend::new()), &CacheConfig::default());
        FeedService::new(repo, cache)
    }

    fn request(direction: Direction, limit: i64) -> FeedRequest {
        FeedRequest {
            direction,
            cursor: Cursor::parse("2025-01-14T00:00:00Z").expect("cursor"),
            tags: TagSet::new(),
            limit,
        }
    }

    #[tokio::test]
    async fn limit_is_clamped_before_querying() {
        let repo = Arc::new(RecordingRepo::default());
        let service = service(repo.clone());

        service.get_page(request(Direction::Before, 0)).await.expect("page");
        service.get_page(request(Direction::Before, 200)).await.expect("page");

        let limits: Vec<u32> = repo
            .queries
            .lock()
            .expect("lock")
            .iter()
            .map(|query| query.limit)
            .collect();
        assert_eq!(limits, vec![1, 100]);
    }

    #[tokio::test]
    async fn second_request_is_served_from_cache() {
        let repo = Arc::new(RecordingRepo {
            items: vec![FeedItem {
                id: 1,
                summary: "s".into(),
                tags: vec!["a".into()],
                channel: "c".into(),
                link: "https://example.com/1".into(),
                published_at: datetime!(2025-01-13 20:00:00 UTC),
                created_at: datetime!(2025-01-13 21:00:00 UTC),
            }],
            ..RecordingRepo::default()
        });
        let service = service(repo.clone());

        let first = service.get_page(request(Direction::Before, 20)).await.expect("page");
        let second = service.get_page(request(Direction::Before, 20)).await.expect("page");

        assert_eq!(first, second);
        assert_eq!(first.next_cursor.as_deref(), Some("2025-01-13T21:00:00Z"));
        assert_eq!(repo.queries.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn empty_pages_differ_by_direction() {
        let repo = Arc::new(RecordingRepo::default());
        let service = service(repo);

        let before = service.get_page(request(Direction::Before, 20)).await.expect("page");
        assert_eq!(before.next_cursor, None);
        assert_eq!(before.count, 0);

        let after = service.get_page(request(Direction::After, 20)).await.expect("page");
        assert_eq!(after.next_cursor.as_deref(), Some("2025-01-14T00:00:00Z"));
    }
}
