pub mod api;
mod health;
mod middleware;

pub use api::rate_limit::ApiRateLimiter;
pub use api::{HttpState, build_api_router};

use axum::http::{Method, Uri};
use axum::{Router, middleware as axum_middleware, routing::get};

use api::error::ApiError;
use middleware::{log_responses, set_request_context};

/// Full application router: the feed API, `/health`, and a JSON 404 for anything else.
pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .merge(build_api_router(state.clone()))
        .route("/health", get(health::health))
        .fallback(route_not_found)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn route_not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::not_found(format!("Route {method} {} not found", uri.path()))
}
