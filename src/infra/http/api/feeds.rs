use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::application::feed::{FeedError, FeedPage, FeedRequest};
use crate::domain::cursor::Cursor;
use crate::domain::feed::{
    DEFAULT_PAGE_LIMIT, Direction, MAX_PAGE_LIMIT, MIN_PAGE_LIMIT, TagSet,
};

use super::error::{ApiError, codes};
use super::state::HttpState;

/// Raw query string. Fields stay textual so bad values map to our own error codes
/// instead of the extractor's rejection text.
#[derive(Debug, Default, Deserialize)]
pub struct FeedParams {
    pub cursor: Option<String>,
    pub tags: Option<String>,
    pub limit: Option<String>,
}

pub async fn feeds_before(
    State(state): State<HttpState>,
    params: Result<Query<FeedParams>, QueryRejection>,
) -> Result<Json<FeedPage>, ApiError> {
    serve(&state, Direction::Before, params).await
}

pub async fn feeds_after(
    State(state): State<HttpState>,
    params: Result<Query<FeedParams>, QueryRejection>,
) -> Result<Json<FeedPage>, ApiError> {
    serve(&state, Direction::After, params).await
}

async fn serve(
    state: &HttpState,
    direction: Direction,
    params: Result<Query<FeedParams>, QueryRejection>,
) -> Result<Json<FeedPage>, ApiError> {
    let Query(params) =
        params.map_err(|err| ApiError::bad_request(codes::BAD_REQUEST, err.body_text()))?;
    let request = feed_request(direction, params)?;
    let page = state.feeds.get_page(request).await?;
    Ok(Json(page))
}

fn feed_request(direction: Direction, params: FeedParams) -> Result<FeedRequest, ApiError> {
    let cursor = match non_empty(params.cursor.as_deref()) {
        Some(raw) => Cursor::parse(raw).map_err(FeedError::from)?,
        None => match direction {
            Direction::Before => {
                Cursor::from_timestamp(OffsetDateTime::now_utc()).map_err(FeedError::from)?
            }
            Direction::After => {
                return Err(ApiError::bad_request(
                    codes::INVALID_CURSOR,
                    "cursor is required",
                ));
            }
        },
    };

    let tags = params
        .tags
        .as_deref()
        .map(TagSet::from_csv)
        .unwrap_or_default();

    Ok(FeedRequest {
        direction,
        cursor,
        tags,
        limit: parse_limit(params.limit.as_deref())?,
    })
}

fn parse_limit(raw: Option<&str>) -> Result<i64, ApiError> {
    match non_empty(raw) {
        None => Ok(i64::from(DEFAULT_PAGE_LIMIT)),
        Some(value) => {
            let limit = value.parse::<i64>().map_err(|_| {
                ApiError::bad_request(
                    codes::INVALID_LIMIT,
                    format!("limit must be an integer, got `{value}`"),
                )
            })?;
            if !(i64::from(MIN_PAGE_LIMIT)..=i64::from(MAX_PAGE_LIMIT)).contains(&limit) {
                return Err(ApiError::bad_request(
                    codes::INVALID_LIMIT,
                    format!(
                        "limit must be between {MIN_PAGE_LIMIT} and {MAX_PAGE_LIMIT}, got {limit}"
                    ),
                ));
            }
            Ok(limit)
        }
    }
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::*;

    fn params(cursor: Option<&str>, tags: Option<&str>, limit: Option<&str>) -> FeedParams {
        FeedParams {
            cursor: cursor.map(str::to_string),
            tags: tags.map(str::to_string),
            limit: limit.map(str::to_string),
        }
    }

    #[test]
    fn before_defaults_cursor_to_now() {
        let started = OffsetDateTime::now_utc().replace_nanosecond(0).expect("ns");
        let request = feed_request(Direction::Before, FeedParams::default()).expect("request");
        assert!(request.cursor.at() >= started);
        assert_eq!(request.limit, i64::from(DEFAULT_PAGE_LIMIT));
        assert!(request.tags.is_empty());
    }

    #[test]
    fn after_requires_cursor() {
        let err = feed_request(Direction::After, params(Some("  "), None, None))
            .expect_err("cursor required");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), codes::INVALID_CURSOR);
    }

    #[test]
    fn tags_and_limit_are_normalized() {
        let request = feed_request(
            Direction::After,
            params(Some("2025-01-14T00:00:00Z"), Some(" tech, ,ai,tech "), Some(" 100 ")),
        )
        .expect("request");
        assert_eq!(request.tags.to_vec(), vec!["ai", "tech"]);
        assert_eq!(request.limit, 100);
        assert_eq!(request.cursor.raw(), "2025-01-14T00:00:00Z");
    }

    #[test]
    fn non_numeric_limit_is_rejected() {
        let err = feed_request(Direction::Before, params(None, None, Some("ten")))
            .expect_err("bad limit");
        assert_eq!(err.code(), codes::INVALID_LIMIT);
    }

    #[test]
    fn limit_outside_page_bounds_is_rejected() {
        for raw in ["0", "-3", "101", "500"] {
            let err = feed_request(Direction::Before, params(None, None, Some(raw)))
                .expect_err("limit out of range");
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
            assert_eq!(err.code(), codes::INVALID_LIMIT);
        }

        let edge = feed_request(Direction::Before, params(None, None, Some("1"))).expect("request");
        assert_eq!(edge.limit, 1);
    }

    #[test]
    fn cursor_outside_utc_range_is_rejected() {
        let err = feed_request(
            Direction::After,
            params(Some("9999-12-31T23:00:00-05:00"), None, None),
        )
        .expect_err("cursor out of range");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), codes::INVALID_CURSOR);
    }

    #[test]
    fn malformed_cursor_is_rejected() {
        let err = feed_request(Direction::Before, params(Some("last tuesday"), None, None))
            .expect_err("bad cursor");
        assert_eq!(err.code(), codes::INVALID_CURSOR);
    }
}
