use std::sync::Arc;

use crate::application::feed::FeedService;
use crate::application::health::HealthService;

use super::rate_limit::ApiRateLimiter;

#[derive(Clone)]
pub struct HttpState {
    pub feeds: FeedService,
    pub health: HealthService,
    pub rate_limiter: Arc<ApiRateLimiter>,
}
