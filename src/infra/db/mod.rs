//! Postgres-backed repository implementations.

mod feed_items;
mod util;

pub use util::map_sqlx_error;

use crate::application::repos::{FeedItemsRepo, FeedQuery, RepoError};
use crate::domain::feed::FeedItem;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Build a pool without connecting; connections are opened on first use so the
    /// process starts even while the database is unreachable.
    pub fn connect_lazy(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(url)
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Stand-in store used when no database URL is configured: every call reports the
/// store as unavailable, so the API answers 500 and `/health` reports `db: disconnected`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedStore;

const DETACHED: &str = "database url is not configured";

#[async_trait]
impl FeedItemsRepo for DetachedStore {
    async fn query_feed(&self, _query: &FeedQuery) -> Result<Vec<FeedItem>, RepoError> {
        Err(RepoError::Unavailable(DETACHED.to_string()))
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        Err(RepoError::Unavailable(DETACHED.to_string()))
    }
}
