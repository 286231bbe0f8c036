use std::net::SocketAddr;
use std::time::Duration;

use crmgate_auth::AuthConfig;
use crmgate_db_postgres::PostgresConfig;
use serde::{Deserialize, Serialize};

use crate::rate_limit::Limit;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn addr(&self) -> SocketAddr {
        let ip = self
            .server
            .host
            .parse()
            .unwrap_or_else(|_| std::net::IpAddr::from([0, 0, 0, 0]));
        SocketAddr::new(ip, self.server.port)
    }

    pub fn validate(&self) -> Result<(), String> {
        // Server
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.request_timeout_ms == 0 {
            return Err("server.request_timeout_ms must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        // Logging
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Storage
        if self.storage.backend == StorageBackend::Postgres
            && self.storage.postgres.url.trim().is_empty()
        {
            return Err(
                "storage.postgres.url is required when storage.backend = \"postgres\"".into(),
            );
        }
        // Redis
        if self.redis.enabled && self.redis.url.trim().is_empty() {
            return Err("redis.enabled=true requires redis.url".into());
        }
        if self.redis.timeout_ms == 0 {
            return Err("redis.timeout_ms must be > 0".into());
        }
        // Cache
        if self.cache.ttl_secs == 0 {
            return Err("cache.ttl_secs must be > 0".into());
        }
        // Rate limiting
        self.rate_limit.validate(self.redis.enabled)?;
        // Auth
        self.auth.validate()?;
        // Events
        if self.events.max_in_flight == 0 {
            return Err("events.max_in_flight must be > 0".into());
        }
        if self.events.publish_timeout_ms == 0 {
            return Err("events.publish_timeout_ms must be > 0".into());
        }
        if self.events.partitions == 0 {
            return Err("events.partitions must be > 0".into());
        }
        if self.events.stream.trim().is_empty() {
            return Err("events.stream must not be empty".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on the whole pipeline for one request, handler included.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
            body_limit_bytes: default_body_limit_bytes(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_body_limit_bytes() -> usize {
    1024 * 1024
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// Process-local tables. Contents are lost on restart.
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default)]
    pub postgres: PostgresConfig,
}

/// Shared Redis used for the cache, the rate-limit counters and the event
/// stream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,
    /// Wait/create/recycle timeout for pooled connections.
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Staleness bound for cached read results.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_key_prefix")]
    pub key_prefix: String,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            key_prefix: default_cache_key_prefix(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    30
}

fn default_cache_key_prefix() -> String {
    "crmgate:cache:".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitBackend {
    /// Per-process counters. Replicas do not share quota.
    #[default]
    Local,
    /// Counters in Redis, shared by every replica.
    Redis,
}

/// What to do with a request when the counter store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendFailurePolicy {
    /// Serve the request and log the outage.
    Allow,
    /// Reject the request as if it were over quota.
    Deny,
}

/// # Example (TOML)
///
/// ```toml
/// [rate_limit]
/// backend = "redis"
/// on_backend_error = "deny"
///
/// [rate_limit.writes]
/// requests = 5
/// period_secs = 60
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub backend: RateLimitBackend,
    /// Required with the redis backend. Has no effect on local counters,
    /// which cannot fail.
    #[serde(default)]
    pub on_backend_error: Option<BackendFailurePolicy>,
    #[serde(default = "default_rate_limit_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_exempt_paths")]
    pub exempt_paths: Vec<String>,
    /// Take the caller identity from the first `X-Forwarded-For` entry.
    #[serde(default = "default_true")]
    pub trust_forwarded_for: bool,
    #[serde(default = "default_limit")]
    pub default: Limit,
    #[serde(default = "default_login_limit")]
    pub login: Limit,
    #[serde(default = "default_writes_limit")]
    pub writes: Limit,
}

impl RateLimitConfig {
    fn validate(&self, redis_enabled: bool) -> Result<(), String> {
        for (name, limit) in [
            ("default", &self.default),
            ("login", &self.login),
            ("writes", &self.writes),
        ] {
            if limit.requests == 0 || limit.period_secs == 0 {
                return Err(format!(
                    "rate_limit.{name}.requests and rate_limit.{name}.period_secs must be > 0"
                ));
            }
        }
        if self.backend == RateLimitBackend::Redis {
            if !redis_enabled {
                return Err("rate_limit.backend = \"redis\" requires redis.enabled=true".into());
            }
            if self.on_backend_error.is_none() {
                return Err(
                    "rate_limit.on_backend_error (\"allow\" or \"deny\") is required with the redis backend"
                        .into(),
                );
            }
        }
        Ok(())
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|p| p == path)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: RateLimitBackend::Local,
            on_backend_error: None,
            key_prefix: default_rate_limit_key_prefix(),
            exempt_paths: default_exempt_paths(),
            trust_forwarded_for: true,
            default: default_limit(),
            login: default_login_limit(),
            writes: default_writes_limit(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_rate_limit_key_prefix() -> String {
    "crmgate:ratelimit:".to_string()
}

fn default_exempt_paths() -> Vec<String> {
    vec![
        "/healthz".to_string(),
        "/readyz".to_string(),
        "/metrics".to_string(),
    ]
}

fn default_limit() -> Limit {
    Limit::new(60, 60)
}

fn default_login_limit() -> Limit {
    Limit::new(5, 60)
}

fn default_writes_limit() -> Limit {
    Limit::new(5, 60)
}

/// Domain event emission. Events go to a Redis stream when `redis.enabled`,
/// otherwise they are only logged.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    #[serde(default = "default_stream")]
    pub stream: String,
    /// Number of streams events are spread over by partition key.
    #[serde(default = "default_partitions")]
    pub partitions: u32,
    /// Approximate per-stream length kept by `XADD MAXLEN ~`.
    #[serde(default = "default_max_len")]
    pub max_len: usize,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

impl EventsConfig {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            stream: default_stream(),
            partitions: default_partitions(),
            max_len: default_max_len(),
            max_in_flight: default_max_in_flight(),
            publish_timeout_ms: default_publish_timeout_ms(),
        }
    }
}

fn default_stream() -> String {
    "crm-events".to_string()
}

fn default_partitions() -> u32 {
    1
}

fn default_max_len() -> usize {
    100_000
}

fn default_max_in_flight() -> usize {
    256
}

fn default_publish_timeout_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Loads the TOML file at `path` (or `crmgate.toml`) when it exists, then
    /// applies `CRMGATE__SECTION__KEY` environment overrides and validates.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or("crmgate.toml"));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        }
        // Environment variable overrides, e.g., CRMGATE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("CRMGATE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.storage.backend = StorageBackend::Memory;
        cfg.auth.secret = "test-secret".into();
        cfg
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.request_timeout_ms, 15_000);
        assert_eq!(cfg.cache.ttl_secs, 30);
        assert_eq!(cfg.events.max_in_flight, 256);
        assert_eq!(cfg.events.publish_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.rate_limit.login, Limit::new(5, 60));
        assert!(cfg.rate_limit.on_backend_error.is_none());
    }

    #[test]
    fn test_valid_memory_config() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_postgres_requires_url() {
        let mut cfg = valid();
        cfg.storage.backend = StorageBackend::Postgres;
        assert!(cfg.validate().is_ok());

        cfg.storage.postgres.url = "  ".into();
        assert!(cfg.validate().unwrap_err().contains("storage.postgres.url"));
    }

    #[test]
    fn test_redis_limiter_requires_redis_and_policy() {
        let mut cfg = valid();
        cfg.rate_limit.backend = RateLimitBackend::Redis;
        assert!(cfg.validate().unwrap_err().contains("redis.enabled"));

        cfg.redis.enabled = true;
        assert!(cfg.validate().unwrap_err().contains("on_backend_error"));

        cfg.rate_limit.on_backend_error = Some(BackendFailurePolicy::Deny);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut cfg = valid();
        cfg.rate_limit.writes = Limit::new(0, 60);
        assert!(cfg.validate().unwrap_err().contains("rate_limit.writes"));
    }

    #[test]
    fn test_invalid_log_level() {
        let mut cfg = valid();
        cfg.logging.level = "loud".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_zero_emitter_capacity_rejected() {
        let mut cfg = valid();
        cfg.events.max_in_flight = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [storage]
            backend = "memory"

            [rate_limit]
            backend = "redis"
            on_backend_error = "deny"

            [rate_limit.writes]
            requests = 10
            period_secs = 30

            [auth]
            secret = "s3cret"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
        assert_eq!(cfg.rate_limit.writes, Limit::new(10, 30));
        assert_eq!(cfg.rate_limit.login, Limit::new(5, 60));
        assert_eq!(
            cfg.rate_limit.on_backend_error,
            Some(BackendFailurePolicy::Deny)
        );
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.auth.token_ttl, Duration::from_secs(24 * 3600));
    }

    #[test]
    fn test_addr_falls_back_to_unspecified() {
        let mut cfg = valid();
        cfg.server.host = "not-an-ip".into();
        cfg.server.port = 9000;
        assert_eq!(cfg.addr().to_string(), "0.0.0.0:9000");
    }
}
