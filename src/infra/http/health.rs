use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::error::ErrorReport;

use super::api::HttpState;

/// `200` while pages can be served, `503` once the store is unreachable. Cache and
/// subscriber outages only downgrade `status` to `degraded`.
pub async fn health(State(state): State<HttpState>) -> Response {
    let report = state.health.report().await;
    if report.is_serving() {
        return (StatusCode::OK, Json(report)).into_response();
    }

    let mut response = (StatusCode::SERVICE_UNAVAILABLE, Json(report)).into_response();
    ErrorReport::from_message(
        "infra::http::health",
        StatusCode::SERVICE_UNAVAILABLE,
        "feed store unreachable",
    )
    .attach(&mut response);
    response
}
