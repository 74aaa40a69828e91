use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::feed::FEED_QUERY_MS;
use crate::cache::{
    CACHE_EVICTED_KEYS_TOTAL, CACHE_HIT_TOTAL, CACHE_MISS_TOTAL, STREAM_MESSAGES_TOTAL,
    STREAM_RECONNECT_TOTAL,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            CACHE_HIT_TOTAL,
            Unit::Count,
            "Feed page lookups answered from the response cache."
        );
        describe_counter!(
            CACHE_MISS_TOTAL,
            Unit::Count,
            "Feed page lookups that fell through to the store, including while the cache was unavailable."
        );
        describe_counter!(
            CACHE_EVICTED_KEYS_TOTAL,
            Unit::Count,
            "Cached feed pages removed by prefix eviction."
        );
        describe_counter!(
            STREAM_MESSAGES_TOTAL,
            Unit::Count,
            "Invalidation messages handled, labelled by acknowledgement outcome."
        );
        describe_counter!(
            STREAM_RECONNECT_TOTAL,
            Unit::Count,
            "Scheduled reconnect attempts to the event log."
        );
        describe_histogram!(
            FEED_QUERY_MS,
            Unit::Milliseconds,
            "Feed store query latency in milliseconds."
        );
    });
}
