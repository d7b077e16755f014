//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "delivery-cache";
const ENV_PREFIX: &str = "DELIVERY_CACHE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DELIVERY_REQUEST_TIMEOUT_SECS: u64 = 20;
pub(crate) const PUBLIC_DELIVERY_ENDPOINT: &str = "https://deliver.kontent.ai";
pub(crate) const PREVIEW_DELIVERY_ENDPOINT: &str = "https://preview-deliver.kontent.ai";
const DEFAULT_SITEMAP_CONTENT_TYPES: [&str; 2] = ["article", "cafe"];

const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_CACHE_AUTO_CONSUME_INTERVAL_MS: u64 = 5000;
const DEFAULT_CACHE_CONSUME_BATCH_LIMIT: usize = 100;
const DEFAULT_CACHE_QUEUE_LIMIT: usize = 1024;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub delivery: DeliverySettings,
    pub cache: CacheSettings,
    pub sitemap: SitemapSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub project_id: String,
    /// Reads go to the preview endpoint when set.
    pub preview_api_key: Option<String>,
    /// Overrides the public or preview endpoint.
    pub base_url: Option<String>,
    pub request_timeout: Duration,
}

impl DeliverySettings {
    /// Endpoint requests are sent to, without the project id.
    pub fn endpoint(&self) -> &str {
        match (&self.base_url, &self.preview_api_key) {
            (Some(base_url), _) => base_url,
            (None, Some(_)) => PREVIEW_DELIVERY_ENDPOINT,
            (None, None) => PUBLIC_DELIVERY_ENDPOINT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub default_ttl_seconds: u64,
    pub fetch_timeout_seconds: u64,
    pub full_purge_on_schema_change: bool,
    pub cascade_to_type_listings: bool,
    pub sweep_interval_seconds: u64,
    pub auto_consume_interval_ms: u64,
    pub consume_batch_limit: usize,
    pub queue_limit: usize,
}

#[derive(Debug, Clone)]
pub struct SitemapSettings {
    /// Content types listed in the sitemap.
    pub content_types: Vec<String>,
    /// Prefix for sitemap URLs. Relative URLs are emitted when unset.
    pub base_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::CheckConfig) | None => {
            raw.apply_serve_overrides(&ServeOverrides::default())
        }
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    delivery: RawDeliverySettings,
    cache: RawCacheSettings,
    sitemap: RawSitemapSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(project_id) = overrides.delivery_project_id.as_ref() {
            self.delivery.project_id = Some(project_id.clone());
        }
        if let Some(key) = overrides.delivery_preview_api_key.as_ref() {
            self.delivery.preview_api_key = Some(key.clone());
        }
        if let Some(base_url) = overrides.delivery_base_url.as_ref() {
            self.delivery.base_url = Some(base_url.clone());
        }
        if let Some(ttl) = overrides.cache_default_ttl_seconds {
            self.cache.default_ttl_seconds = Some(ttl);
        }
        if let Some(timeout) = overrides.cache_fetch_timeout_seconds {
            self.cache.fetch_timeout_seconds = Some(timeout);
        }
        if let Some(full_purge) = overrides.cache_full_purge_on_schema_change {
            self.cache.full_purge_on_schema_change = Some(full_purge);
        }
        if let Some(limit) = overrides.cache_queue_limit {
            self.cache.queue_limit = Some(limit);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            delivery,
            cache,
            sitemap,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let delivery = build_delivery_settings(delivery)?;
        let cache = build_cache_settings(cache)?;
        let sitemap = build_sitemap_settings(sitemap)?;

        Ok(Self {
            server,
            logging,
            delivery,
            cache,
            sitemap,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_delivery_settings(delivery: RawDeliverySettings) -> Result<DeliverySettings, LoadError> {
    let project_id = non_blank(delivery.project_id)
        .ok_or_else(|| LoadError::invalid("delivery.project_id", "must be set"))?;
    let preview_api_key = non_blank(delivery.preview_api_key);

    let base_url = non_blank(delivery.base_url)
        .map(|value| {
            url::Url::parse(&value)
                .map(|_| value.trim_end_matches('/').to_string())
                .map_err(|err| LoadError::invalid("delivery.base_url", format!("invalid url: {err}")))
        })
        .transpose()?;

    let timeout_secs = delivery
        .request_timeout_seconds
        .unwrap_or(DEFAULT_DELIVERY_REQUEST_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "delivery.request_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(DeliverySettings {
        project_id,
        preview_api_key,
        base_url,
        request_timeout: Duration::from_secs(timeout_secs),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let default_ttl_seconds = cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if default_ttl_seconds == 0 {
        return Err(LoadError::invalid(
            "cache.default_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let consume_batch_limit = cache
        .consume_batch_limit
        .unwrap_or(DEFAULT_CACHE_CONSUME_BATCH_LIMIT);
    if consume_batch_limit == 0 {
        return Err(LoadError::invalid(
            "cache.consume_batch_limit",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        default_ttl_seconds,
        fetch_timeout_seconds: cache
            .fetch_timeout_seconds
            .unwrap_or(DEFAULT_CACHE_FETCH_TIMEOUT_SECS),
        full_purge_on_schema_change: cache.full_purge_on_schema_change.unwrap_or(true),
        cascade_to_type_listings: cache.cascade_to_type_listings.unwrap_or(true),
        sweep_interval_seconds: cache
            .sweep_interval_seconds
            .unwrap_or(DEFAULT_CACHE_SWEEP_INTERVAL_SECS),
        auto_consume_interval_ms: cache
            .auto_consume_interval_ms
            .unwrap_or(DEFAULT_CACHE_AUTO_CONSUME_INTERVAL_MS),
        consume_batch_limit,
        queue_limit: cache.queue_limit.unwrap_or(DEFAULT_CACHE_QUEUE_LIMIT),
    })
}

fn build_sitemap_settings(sitemap: RawSitemapSettings) -> Result<SitemapSettings, LoadError> {
    let content_types = match sitemap.content_types {
        Some(types) => {
            let types: Vec<String> = types
                .into_iter()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .collect();
            if types.is_empty() {
                return Err(LoadError::invalid(
                    "sitemap.content_types",
                    "must name at least one content type",
                ));
            }
            types
        }
        None => DEFAULT_SITEMAP_CONTENT_TYPES
            .iter()
            .map(|value| value.to_string())
            .collect(),
    };

    let base_url = non_blank(sitemap.base_url).map(|value| value.trim_end_matches('/').to_string());

    Ok(SitemapSettings {
        content_types,
        base_url,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDeliverySettings {
    project_id: Option<String>,
    preview_api_key: Option<String>,
    base_url: Option<String>,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    default_ttl_seconds: Option<u64>,
    fetch_timeout_seconds: Option<u64>,
    full_purge_on_schema_change: Option<bool>,
    cascade_to_type_listings: Option<bool>,
    sweep_interval_seconds: Option<u64>,
    auto_consume_interval_ms: Option<u64>,
    consume_batch_limit: Option<usize>,
    queue_limit: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSitemapSettings {
    content_types: Option<Vec<String>>,
    base_url: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
