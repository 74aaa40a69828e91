use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::application::error::ErrorReport;
use crate::application::feed::FeedError;
use crate::domain::error::DomainError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const INVALID_CURSOR: &str = "INVALID_CURSOR";
    pub const INVALID_LIMIT: &str = "INVALID_LIMIT";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// JSON error response. The public message goes to the client; the report (when
/// present) carries the internal cause for the response logger.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    report: Option<ErrorReport>,
    retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            report: None,
            retry_after: None,
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message)
    }

    pub fn internal(source: &'static str, error: &dyn std::error::Error) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::INTERNAL_ERROR,
            "Internal server error",
        )
        .with_report(ErrorReport::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            error,
        ))
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        let mut error = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            codes::RATE_LIMIT_EXCEEDED,
            "Too many requests, please try again later",
        )
        .with_report(ErrorReport::from_message(
            "infra::http::api::rate_limit",
            StatusCode::TOO_MANY_REQUESTS,
            format!("rate_limited: retry_after={retry_after}"),
        ));
        error.retry_after = Some(retry_after);
        error
    }

    pub fn with_report(mut self, report: ErrorReport) -> Self {
        self.report = Some(report);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = self.report.unwrap_or_else(|| {
            ErrorReport::from_message(
                "infra::http::api::error",
                self.status,
                format!("{}: {}", self.code, self.message),
            )
        });
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message,
            },
        };

        let mut response = (self.status, Json(body)).into_response();
        if let Some(seconds) = self.retry_after
            && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
        {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        report.attach(&mut response);
        response
    }
}

impl From<FeedError> for ApiError {
    fn from(error: FeedError) -> Self {
        match error {
            FeedError::Domain(DomainError::InvalidCursor { value, reason }) => {
                ApiError::bad_request(codes::INVALID_CURSOR, format!("cursor `{value}`: {reason}"))
            }
            FeedError::Domain(DomainError::Validation { message }) => {
                ApiError::bad_request(codes::BAD_REQUEST, message)
            }
            FeedError::Domain(ref domain @ DomainError::UnrepresentableTimestamp { .. }) => {
                ApiError::internal("infra::http::api::feeds", domain)
            }
            FeedError::Repo(ref repo) => ApiError::internal("infra::http::api::feeds", repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::RepoError;

    #[test]
    fn store_failures_hide_details() {
        let error = ApiError::from(FeedError::Repo(RepoError::Persistence(
            "connection reset".into(),
        )));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.code(), codes::INTERNAL_ERROR);

        let response = error.into_response();
        let report = response
            .extensions()
            .get::<ErrorReport>()
            .expect("report attached");
        assert!(report.messages[0].contains("connection reset"));
    }

    #[test]
    fn invalid_cursor_is_a_client_error() {
        let error = ApiError::from(FeedError::Domain(DomainError::invalid_cursor(
            "yesterday",
            "not a timestamp",
        )));
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error.code(), codes::INVALID_CURSOR);
    }

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = ApiError::rate_limited(60).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).map(|v| v.as_bytes()),
            Some(&b"60"[..])
        );
    }
}
