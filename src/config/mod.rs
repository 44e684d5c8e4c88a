//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "kasha";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 25;
const DEFAULT_CACHE_MAXAGE_SECS: u64 = 60;
const DEFAULT_CACHE_S_MAXAGE_SECS: u64 = 86_400;
const DEFAULT_CACHE_ROBOTS_TXT_SECS: u64 = 3_600;
const DEFAULT_CACHE_SITEMAP_SECS: u64 = 3_600;
const DEFAULT_CACHE_REMOVE_AFTER_SECS: u64 = 30 * 86_400;
const DEFAULT_WORKER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BUS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_STORE_DATABASE: &str = "kasha";
const DEFAULT_STORE_POOL_SIZE: u32 = 10;
const DEFAULT_SITE_CONFIG_TTL_SECS: u64 = 60;
const DEFAULT_SITE_CONFIG_LOOKUP_TIMEOUT_SECS: u64 = 5;
const DEFAULT_CALLBACK_ATTEMPT_TIMEOUT_SECS: u64 = 10;

/// Command-line arguments for the Kasha binary.
#[derive(Debug, Parser)]
#[command(name = "kasha", version, about = "Kasha prerender gateway")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "KASHA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the gateway HTTP service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the HTTP listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the HTTP listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Hostnames that select API mode (repeatable).
    #[arg(long = "api-host", value_name = "HOST")]
    pub api_hosts: Vec<String>,

    /// Reject requests for hosts without a stored site config.
    #[arg(
        long = "disallow-unknown-site",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub disallow_unknown_site: Option<bool>,

    /// Serve the static debug homepage in API mode.
    #[arg(
        long = "enable-homepage",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub enable_homepage: Option<bool>,

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

    /// Override the snapshot store connection URL.
    #[arg(long = "store-url", value_name = "URL")]
    pub store_url: Option<String>,

    /// Override the snapshot store pool size.
    #[arg(long = "store-pool-size", value_name = "COUNT")]
    pub store_pool_size: Option<u32>,

    /// Override the bus reader connection URL.
    #[arg(long = "bus-reader", value_name = "URL")]
    pub bus_reader: Option<String>,

    /// Override the bus writer connection URL.
    #[arg(long = "bus-writer", value_name = "URL")]
    pub bus_writer: Option<String>,

    /// Override the render worker timeout.
    #[arg(long = "worker-timeout-seconds", value_name = "SECONDS")]
    pub worker_timeout_seconds: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub worker: WorkerSettings,
    pub bus: BusSettings,
    pub store: StoreSettings,
    pub site_config: SiteConfigSettings,
    pub callback: CallbackSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub api_hosts: Vec<String>,
    pub enable_homepage: bool,
    pub disallow_unknown_site: bool,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Freshness windows and artifact cache lifetimes, in wall-clock durations.
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub maxage: Duration,
    pub s_maxage: Duration,
    pub robots_txt: Duration,
    pub sitemap: Duration,
    pub remove_after: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BusSettings {
    pub reader: String,
    pub writer: String,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub url: Option<String>,
    pub database: String,
    pub pool_size: NonZeroU32,
}

#[derive(Debug, Clone, Copy)]
pub struct SiteConfigSettings {
    pub ttl: Duration,
    pub lookup_timeout: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct CallbackSettings {
    pub attempt_timeout: Duration,
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

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("KASHA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
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
    cache: RawCacheSettings,
    worker: RawWorkerSettings,
    bus: RawBusSettings,
    store: RawStoreSettings,
    site_config: RawSiteConfigSettings,
    callback: RawCallbackSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if !overrides.api_hosts.is_empty() {
            self.server.api_hosts = Some(overrides.api_hosts.clone());
        }
        if let Some(value) = overrides.disallow_unknown_site {
            self.server.disallow_unknown_site = Some(value);
        }
        if let Some(value) = overrides.enable_homepage {
            self.server.enable_homepage = Some(value);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.store_url.as_ref() {
            self.store.url = Some(url.clone());
        }
        if let Some(size) = overrides.store_pool_size {
            self.store.pool_size = Some(size);
        }
        if let Some(url) = overrides.bus_reader.as_ref() {
            self.bus.reader = Some(url.clone());
        }
        if let Some(url) = overrides.bus_writer.as_ref() {
            self.bus.writer = Some(url.clone());
        }
        if let Some(seconds) = overrides.worker_timeout_seconds {
            self.worker.timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            worker,
            bus,
            store,
            site_config,
            callback,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let worker = build_worker_settings(worker)?;
        let bus = build_bus_settings(bus);
        let store = build_store_settings(store)?;
        let site_config = build_site_config_settings(site_config)?;
        let callback = build_callback_settings(callback)?;

        Ok(Self {
            server,
            logging,
            cache,
            worker,
            bus,
            store,
            site_config,
            callback,
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

    let api_hosts = server
        .api_hosts
        .unwrap_or_default()
        .into_iter()
        .map(|host| host.trim().to_ascii_lowercase())
        .filter(|host| !host.is_empty())
        .collect();

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
        api_hosts,
        enable_homepage: server.enable_homepage.unwrap_or(false),
        disallow_unknown_site: server.disallow_unknown_site.unwrap_or(false),
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

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let maxage = positive_secs(
        cache.maxage.unwrap_or(DEFAULT_CACHE_MAXAGE_SECS),
        "cache.maxage",
    )?;
    let s_maxage = positive_secs(
        cache.s_maxage.unwrap_or(DEFAULT_CACHE_S_MAXAGE_SECS),
        "cache.s_maxage",
    )?;
    if s_maxage < maxage {
        return Err(LoadError::invalid(
            "cache.s_maxage",
            "must be at least cache.maxage",
        ));
    }
    let robots_txt = positive_secs(
        cache.robots_txt.unwrap_or(DEFAULT_CACHE_ROBOTS_TXT_SECS),
        "cache.robots_txt",
    )?;
    let sitemap = positive_secs(
        cache.sitemap.unwrap_or(DEFAULT_CACHE_SITEMAP_SECS),
        "cache.sitemap",
    )?;
    let remove_after = positive_secs(
        cache.remove_after.unwrap_or(DEFAULT_CACHE_REMOVE_AFTER_SECS),
        "cache.remove_after",
    )?;
    if remove_after < s_maxage {
        return Err(LoadError::invalid(
            "cache.remove_after",
            "must be at least cache.s_maxage",
        ));
    }

    Ok(CacheSettings {
        maxage,
        s_maxage,
        robots_txt,
        sitemap,
        remove_after,
    })
}

fn build_worker_settings(worker: RawWorkerSettings) -> Result<WorkerSettings, LoadError> {
    let timeout = positive_secs(
        worker.timeout_seconds.unwrap_or(DEFAULT_WORKER_TIMEOUT_SECS),
        "worker.timeout_seconds",
    )?;
    Ok(WorkerSettings { timeout })
}

fn build_bus_settings(bus: RawBusSettings) -> BusSettings {
    // The reader drives the reply subscription, the writer publishes jobs;
    // a single-instance deployment may point both at the same URL.
    let writer = bus.writer.unwrap_or_else(|| DEFAULT_BUS_URL.to_string());
    let reader = bus.reader.unwrap_or_else(|| writer.clone());
    BusSettings { reader, writer }
}

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let url = store.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let database = store
        .database
        .unwrap_or_else(|| DEFAULT_STORE_DATABASE.to_string());

    let pool_value = store.pool_size.unwrap_or(DEFAULT_STORE_POOL_SIZE);
    let pool_size = NonZeroU32::new(pool_value)
        .ok_or_else(|| LoadError::invalid("store.pool_size", "must be greater than zero"))?;

    Ok(StoreSettings {
        url,
        database,
        pool_size,
    })
}

fn build_site_config_settings(
    site_config: RawSiteConfigSettings,
) -> Result<SiteConfigSettings, LoadError> {
    let ttl = positive_secs(
        site_config.ttl_seconds.unwrap_or(DEFAULT_SITE_CONFIG_TTL_SECS),
        "site_config.ttl_seconds",
    )?;
    let lookup_timeout = positive_secs(
        site_config
            .lookup_timeout_seconds
            .unwrap_or(DEFAULT_SITE_CONFIG_LOOKUP_TIMEOUT_SECS),
        "site_config.lookup_timeout_seconds",
    )?;
    Ok(SiteConfigSettings {
        ttl,
        lookup_timeout,
    })
}

fn build_callback_settings(callback: RawCallbackSettings) -> Result<CallbackSettings, LoadError> {
    let attempt_timeout = positive_secs(
        callback
            .attempt_timeout_seconds
            .unwrap_or(DEFAULT_CALLBACK_ATTEMPT_TIMEOUT_SECS),
        "callback.attempt_timeout_seconds",
    )?;
    Ok(CallbackSettings { attempt_timeout })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    api_hosts: Option<Vec<String>>,
    enable_homepage: Option<bool>,
    disallow_unknown_site: Option<bool>,
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
struct RawCacheSettings {
    maxage: Option<u64>,
    s_maxage: Option<u64>,
    robots_txt: Option<u64>,
    sitemap: Option<u64>,
    remove_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWorkerSettings {
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBusSettings {
    reader: Option<String>,
    writer: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    url: Option<String>,
    database: Option<String>,
    pool_size: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteConfigSettings {
    ttl_seconds: Option<u64>,
    lookup_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCallbackSettings {
    attempt_timeout_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn positive_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}
