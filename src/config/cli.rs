use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the delivery-cache binary.
#[derive(Debug, Parser)]
#[command(
    name = "delivery-cache",
    version,
    about = "Caching proxy for a headless CMS delivery API"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "DELIVERY_CACHE_CONFIG_FILE",
        value_name = "PATH"
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Load and validate the configuration, then exit.
    #[command(name = "check-config")]
    CheckConfig,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the CMS project id.
    #[arg(long = "delivery-project-id", value_name = "ID")]
    pub delivery_project_id: Option<String>,

    /// Override the preview API key; reads go to the preview endpoint when set.
    #[arg(long = "delivery-preview-api-key", value_name = "KEY")]
    pub delivery_preview_api_key: Option<String>,

    /// Override the delivery API base URL.
    #[arg(long = "delivery-base-url", value_name = "URL")]
    pub delivery_base_url: Option<String>,

    /// Override the cache entry lifetime.
    #[arg(long = "cache-default-ttl-seconds", value_name = "SECONDS")]
    pub cache_default_ttl_seconds: Option<u64>,

    /// Override the upstream fetch timeout (0 disables it).
    #[arg(long = "cache-fetch-timeout-seconds", value_name = "SECONDS")]
    pub cache_fetch_timeout_seconds: Option<u64>,

    /// Purge the whole cache on content type or taxonomy changes.
    #[arg(
        long = "cache-full-purge-on-schema-change",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_full_purge_on_schema_change: Option<bool>,

    /// Override the maximum number of queued notifications.
    #[arg(long = "cache-queue-limit", value_name = "COUNT")]
    pub cache_queue_limit: Option<usize>,
}
