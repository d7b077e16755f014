use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
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
            "delivery_cache_hit_total",
            Unit::Count,
            "Reads served from a cached entry or an in-flight fetch."
        );
        describe_counter!(
            "delivery_cache_miss_total",
            Unit::Count,
            "Reads that started an upstream fetch."
        );
        describe_counter!(
            "delivery_cache_purge_total",
            Unit::Count,
            "Cached entries removed by invalidation."
        );
        describe_counter!(
            "delivery_cache_discarded_total",
            Unit::Count,
            "Fetched responses not installed because an invalidation overtook them."
        );
        describe_gauge!(
            "delivery_cache_notification_queue_len",
            Unit::Count,
            "Notifications waiting to be consumed."
        );
        describe_counter!(
            "delivery_cache_notification_dropped_total",
            Unit::Count,
            "Notifications dropped due to queue overflow."
        );
        describe_histogram!(
            "delivery_cache_consume_ms",
            Unit::Milliseconds,
            "Invalidation pass latency in milliseconds."
        );
    });
}
