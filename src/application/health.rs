//! Dependency health summary for the `/health` endpoint.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::application::feed::FeedService;
use crate::cache::{ConsumerStatus, InvalidationConsumer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Overall {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Connected,
    Disconnected,
}

impl Connectivity {
    fn from_bool(connected: bool) -> Self {
        if connected {
            Connectivity::Connected
        } else {
            Connectivity::Disconnected
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: Overall,
    pub db: Connectivity,
    pub redis: Connectivity,
    pub message_subscriber: ConsumerStatusView,
}

impl HealthReport {
    /// The store is the only hard dependency; without it no page can be served.
    pub fn is_serving(&self) -> bool {
        self.db == Connectivity::Connected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumerStatusView {
    Running,
    Paused,
    Stopped,
}

impl From<ConsumerStatus> for ConsumerStatusView {
    fn from(status: ConsumerStatus) -> Self {
        match status {
            ConsumerStatus::Running => ConsumerStatusView::Running,
            ConsumerStatus::Paused => ConsumerStatusView::Paused,
            ConsumerStatus::Stopped => ConsumerStatusView::Stopped,
        }
    }
}

#[derive(Clone)]
pub struct HealthService {
    feeds: FeedService,
    consumer: Option<Arc<InvalidationConsumer>>,
}

impl HealthService {
    pub fn new(feeds: FeedService, consumer: Option<Arc<InvalidationConsumer>>) -> Self {
        Self { feeds, consumer }
    }

    pub async fn report(&self) -> HealthReport {
        let db_connected = match self.feeds.store_health().await {
            Ok(()) => true,
            Err(err) => {
                warn!(target = "application::health", error = %err, "store health check failed");
                false
            }
        };
        let redis_connected = self.feeds.cache().is_available();
        let subscriber = self
            .consumer
            .as_ref()
            .map(|consumer| consumer.status())
            .unwrap_or(ConsumerStatus::Stopped);

        let status = if db_connected && redis_connected && subscriber == ConsumerStatus::Running {
            Overall::Ok
        } else {
            Overall::Degraded
        };

        HealthReport {
            status,
            db: Connectivity::from_bool(db_connected),
            redis: Connectivity::from_bool(redis_connected),
            message_subscriber: subscriber.into(),
        }
    }
}
