use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::repos::{FeedItemsRepo, FeedQuery, RepoError},
    domain::feed::{Direction, FeedItem},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct FeedItemRow {
    id: i64,
    display_summary: String,
    channel: String,
    original_link: String,
    published_at: OffsetDateTime,
    created_at: OffsetDateTime,
}

impl FeedItemRow {
    fn into_item(self, tags: Vec<String>) -> FeedItem {
        FeedItem {
            id: self.id,
            summary: self.display_summary,
            tags,
            channel: self.channel,
            link: self.original_link,
            published_at: self.published_at,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct KeywordRow {
    feed_item_id: i64,
    keyword: String,
}

/// Build the page query. `created_at` bounds the page strictly on the cursor side;
/// `id` breaks ties between items sharing a timestamp.
fn build_feed_query(query: &FeedQuery) -> QueryBuilder<'static, Postgres> {
    let (comparison, order) = match query.direction {
        Direction::Before => ("<", "DESC"),
        Direction::After => (">", "ASC"),
    };

    let mut qb = QueryBuilder::new(
        "SELECT f.id, f.display_summary, f.channel, f.original_link, f.published_at, f.created_at \
         FROM feed_items f WHERE f.created_at ",
    );
    qb.push(comparison);
    qb.push(" ");
    qb.push_bind(query.cursor);

    if !query.tags.is_empty() {
        qb.push(
            " AND EXISTS (SELECT 1 FROM feed_keywords k \
             WHERE k.feed_item_id = f.id AND k.keyword = ANY(",
        );
        qb.push_bind(query.tags.to_vec());
        qb.push("))");
    }

    qb.push(" ORDER BY f.created_at ");
    qb.push(order);
    qb.push(", f.id ");
    qb.push(order);
    qb.push(" LIMIT ");
    qb.push_bind(i64::from(query.limit));
    qb
}

impl PostgresRepositories {
    async fn load_keywords(&self, ids: &[i64]) -> Result<HashMap<i64, Vec<String>>, RepoError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, KeywordRow>(
            r#"
            SELECT DISTINCT feed_item_id, keyword
            FROM feed_keywords
            WHERE feed_item_id = ANY($1)
            ORDER BY feed_item_id, keyword
            "#,
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut grouped: HashMap<i64, Vec<String>> = HashMap::with_capacity(ids.len());
        for row in rows {
            grouped.entry(row.feed_item_id).or_default().push(row.keyword);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl FeedItemsRepo for PostgresRepositories {
    async fn query_feed(&self, query: &FeedQuery) -> Result<Vec<FeedItem>, RepoError> {
        let rows = build_feed_query(query)
            .build_query_as::<FeedItemRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut keywords = self.load_keywords(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let tags = keywords.remove(&row.id).unwrap_or_default();
                row.into_item(tags)
            })
            .collect())
    }

    async fn health_check(&self) -> Result<(), RepoError> {
        self.ping().await.map_err(map_sqlx_error)
    }
}
