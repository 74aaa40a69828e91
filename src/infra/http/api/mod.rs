pub mod error;
pub mod feeds;
pub mod middleware;
pub mod rate_limit;
pub mod state;

pub use state::HttpState;

use axum::{Router, middleware as axum_middleware, routing::get};

pub fn build_api_router(state: HttpState) -> Router<HttpState> {
    Router::new()
        .route("/api/v1/feeds/before", get(feeds::feeds_before))
        .route("/api/v1/feeds/after", get(feeds::feeds_after))
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::api_rate_limit,
        ))
}
