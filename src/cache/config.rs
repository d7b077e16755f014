//! Cache configuration.
//!
//! Controls entry lifetime, single-flight fetch timeouts and how webhook
//! notifications are consumed, via the `[cache]` section of
//! `delivery-cache.toml`.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TTL_SECONDS: u64 = 300;
const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_SWEEP_INTERVAL_SECONDS: u64 = 60;
const DEFAULT_AUTO_CONSUME_INTERVAL_MS: u64 = 5000;
const DEFAULT_CONSUME_BATCH_LIMIT: usize = 100;
const DEFAULT_QUEUE_LIMIT: usize = 1024;

/// Cache configuration from `delivery-cache.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a populated entry.
    pub default_ttl_seconds: u64,
    /// Upper bound for one upstream fetch. Zero disables the timeout.
    pub fetch_timeout_seconds: u64,
    /// Purge the whole cache on content type or taxonomy changes.
    pub full_purge_on_schema_change: bool,
    /// Published or upserted items also purge listings of their content type.
    pub cascade_to_type_listings: bool,
    /// Interval of the expired-entry sweep. Zero disables the sweep.
    pub sweep_interval_seconds: u64,
    /// Auto-consume interval (ms) for queued notifications.
    pub auto_consume_interval_ms: u64,
    /// Maximum notifications per consumption batch.
    pub consume_batch_limit: usize,
    /// Maximum queued notifications. Zero means unbounded.
    pub queue_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            fetch_timeout_seconds: DEFAULT_FETCH_TIMEOUT_SECONDS,
            full_purge_on_schema_change: true,
            cascade_to_type_listings: true,
            sweep_interval_seconds: DEFAULT_SWEEP_INTERVAL_SECONDS,
            auto_consume_interval_ms: DEFAULT_AUTO_CONSUME_INTERVAL_MS,
            consume_batch_limit: DEFAULT_CONSUME_BATCH_LIMIT,
            queue_limit: DEFAULT_QUEUE_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            default_ttl_seconds: settings.default_ttl_seconds,
            fetch_timeout_seconds: settings.fetch_timeout_seconds,
            full_purge_on_schema_change: settings.full_purge_on_schema_change,
            cascade_to_type_listings: settings.cascade_to_type_listings,
            sweep_interval_seconds: settings.sweep_interval_seconds,
            auto_consume_interval_ms: settings.auto_consume_interval_ms,
            consume_batch_limit: settings.consume_batch_limit,
            queue_limit: settings.queue_limit,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_seconds > 0).then(|| Duration::from_secs(self.fetch_timeout_seconds))
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_seconds > 0)
            .then(|| Duration::from_secs(self.sweep_interval_seconds))
    }

    pub fn auto_consume_interval(&self) -> Option<Duration> {
        (self.auto_consume_interval_ms > 0)
            .then(|| Duration::from_millis(self.auto_consume_interval_ms))
    }

    /// Returns the queue bound, `None` when unbounded.
    pub fn queue_bound(&self) -> Option<usize> {
        (self.queue_limit > 0).then_some(self.queue_limit)
    }

    /// Returns the batch limit, clamping to 1 if zero.
    pub fn batch_limit(&self) -> usize {
        self.consume_batch_limit.max(1)
    }
}
