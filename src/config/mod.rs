//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{CliArgs, Command, InvalidateArgs, RedisOverride, ServeArgs, ServeOverrides};

use crate::cache::CacheBackendKind;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "feedline";
const ENV_PREFIX: &str = "FEEDLINE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379/0";
const DEFAULT_REDIS_CONNECT_TIMEOUT_MS: u64 = 2000;
const DEFAULT_REDIS_PROBE_INTERVAL_MS: u64 = 5000;
const DEFAULT_CACHE_NAMESPACE: &str = "feedline:api:cache:";
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_STREAM_NAME: &str = "feed-generation:new-feed";
const DEFAULT_STREAM_GROUP: &str = "api-notifiers";
const DEFAULT_STREAM_CONSUMER: &str = "api-worker-1";
const DEFAULT_STREAM_BLOCK_TIMEOUT_MS: u64 = 5000;
const DEFAULT_STREAM_IDLE_POLL_MS: u64 = 1000;
const DEFAULT_STREAM_BACKOFF_STEP_MS: u64 = 100;
const DEFAULT_STREAM_BACKOFF_MAX_MS: u64 = 30_000;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u64 = 100;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub cache: CacheSettings,
    pub stream: StreamSettings,
    pub rate_limit: RateLimitSettings,
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
pub struct DatabaseSettings {
    /// Without a URL the API still serves, reporting the store as disconnected.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub connect_timeout: Duration,
    pub probe_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub backend: CacheBackendKind,
    pub namespace: String,
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub enabled: bool,
    pub name: String,
    pub group: String,
    pub consumer: String,
    pub block_timeout: Duration,
    pub idle_poll: Duration,
    pub backoff_step: Duration,
    pub backoff_max: Duration,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub window_seconds: NonZeroU32,
    pub max_requests: NonZeroU32,
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
        Some(Command::Invalidate(args)) => raw.apply_redis_override(&args.redis),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
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
    database: RawDatabaseSettings,
    redis: RawRedisSettings,
    cache: RawCacheSettings,
    stream: RawStreamSettings,
    rate_limit: RawRateLimitSettings,
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
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
        if let Some(enabled) = overrides.stream_enabled {
            self.stream.enabled = Some(enabled);
        }
        if let Some(consumer) = overrides.stream_consumer.as_ref() {
            self.stream.consumer = Some(consumer.clone());
        }
        if let Some(window) = overrides.rate_limit_window_seconds {
            self.rate_limit.window_seconds = Some(window);
        }
        if let Some(max) = overrides.rate_limit_max_requests {
            self.rate_limit.max_requests = Some(max);
        }

        self.apply_redis_override(&overrides.redis);
    }

    fn apply_redis_override(&mut self, overrides: &RedisOverride) {
        if let Some(url) = overrides.redis_url.as_ref() {
            self.redis.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            redis,
            cache,
            stream,
            rate_limit,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            redis: build_redis_settings(redis)?,
            cache: build_cache_settings(cache)?,
            stream: build_stream_settings(stream)?,
            rate_limit: build_rate_limit_settings(rate_limit)?,
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
    let graceful_shutdown = positive_duration(
        graceful_secs,
        Duration::from_secs,
        "server.graceful_shutdown_seconds",
    )?;

    Ok(ServerSettings {
        addr,
        graceful_shutdown,
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    let acquire_timeout = positive_duration(
        database
            .acquire_timeout_seconds
            .unwrap_or(DEFAULT_DB_ACQUIRE_TIMEOUT_SECS),
        Duration::from_secs,
        "database.acquire_timeout_seconds",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
        acquire_timeout,
    })
}

fn build_redis_settings(redis: RawRedisSettings) -> Result<RedisSettings, LoadError> {
    let url = non_blank(redis.url).unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());
    if !(url.starts_with("redis://") || url.starts_with("rediss://")) {
        return Err(LoadError::invalid(
            "redis.url",
            "expected a redis:// or rediss:// URL",
        ));
    }

    let connect_timeout = positive_duration(
        redis
            .connect_timeout_ms
            .unwrap_or(DEFAULT_REDIS_CONNECT_TIMEOUT_MS),
        Duration::from_millis,
        "redis.connect_timeout_ms",
    )?;
    let probe_interval = positive_duration(
        redis
            .probe_interval_ms
            .unwrap_or(DEFAULT_REDIS_PROBE_INTERVAL_MS),
        Duration::from_millis,
        "redis.probe_interval_ms",
    )?;

    Ok(RedisSettings {
        url,
        connect_timeout,
        probe_interval,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache.backend.as_deref().map(str::trim) {
        None | Some("redis") => CacheBackendKind::Redis,
        Some("memory") => CacheBackendKind::Memory,
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.backend",
                format!("unknown backend `{other}` (expected redis or memory)"),
            ));
        }
    };

    let namespace = cache
        .namespace
        .unwrap_or_else(|| DEFAULT_CACHE_NAMESPACE.to_string());

    let ttl = positive_duration(
        cache.ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        Duration::from_secs,
        "cache.ttl_seconds",
    )?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        backend,
        namespace,
        ttl,
    })
}

fn build_stream_settings(stream: RawStreamSettings) -> Result<StreamSettings, LoadError> {
    let name = required_name(stream.name, DEFAULT_STREAM_NAME, "stream.name")?;
    let group = required_name(stream.group, DEFAULT_STREAM_GROUP, "stream.group")?;
    let consumer = required_name(stream.consumer, DEFAULT_STREAM_CONSUMER, "stream.consumer")?;

    let block_timeout = positive_duration(
        stream
            .block_timeout_ms
            .unwrap_or(DEFAULT_STREAM_BLOCK_TIMEOUT_MS),
        Duration::from_millis,
        "stream.block_timeout_ms",
    )?;
    let idle_poll = positive_duration(
        stream.idle_poll_ms.unwrap_or(DEFAULT_STREAM_IDLE_POLL_MS),
        Duration::from_millis,
        "stream.idle_poll_ms",
    )?;
    let backoff_step = positive_duration(
        stream
            .backoff_step_ms
            .unwrap_or(DEFAULT_STREAM_BACKOFF_STEP_MS),
        Duration::from_millis,
        "stream.backoff_step_ms",
    )?;
    let backoff_max = positive_duration(
        stream.backoff_max_ms.unwrap_or(DEFAULT_STREAM_BACKOFF_MAX_MS),
        Duration::from_millis,
        "stream.backoff_max_ms",
    )?;
    if backoff_max < backoff_step {
        return Err(LoadError::invalid(
            "stream.backoff_max_ms",
            "must not be smaller than stream.backoff_step_ms",
        ));
    }

    Ok(StreamSettings {
        enabled: stream.enabled.unwrap_or(true),
        name,
        group,
        consumer,
        block_timeout,
        idle_poll,
        backoff_step,
        backoff_max,
    })
}

fn build_rate_limit_settings(
    rate_limit: RawRateLimitSettings,
) -> Result<RateLimitSettings, LoadError> {
    let window_seconds = non_zero_u32(
        rate_limit
            .window_seconds
            .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        "rate_limit.window_seconds",
    )?;
    let max_requests = non_zero_u32(
        rate_limit
            .max_requests
            .unwrap_or(DEFAULT_RATE_LIMIT_MAX_REQUESTS),
        "rate_limit.max_requests",
    )?;

    Ok(RateLimitSettings {
        window_seconds,
        max_requests,
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
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRedisSettings {
    url: Option<String>,
    connect_timeout_ms: Option<u64>,
    probe_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    backend: Option<String>,
    namespace: Option<String>,
    ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStreamSettings {
    enabled: Option<bool>,
    name: Option<String>,
    group: Option<String>,
    consumer: Option<String>,
    block_timeout_ms: Option<u64>,
    idle_poll_ms: Option<u64>,
    backoff_step_ms: Option<u64>,
    backoff_max_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    window_seconds: Option<u64>,
    max_requests: Option<u64>,
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

fn required_name(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    match value {
        None => Ok(default.to_string()),
        Some(value) => non_blank(Some(value)).ok_or_else(|| LoadError::invalid(key, "must not be empty")),
    }
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn positive_duration(
    value: u64,
    unit: fn(u64) -> Duration,
    key: &'static str,
) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(unit(value))
}

#[cfg(test)]
mod tests;
