//! # API Configuration
//!
//! Environment-based configuration for the leaderboard service.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use leaderboard_persistence::PoolConfig;

/// API server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub server_addr: SocketAddr,

    /// Which store backs the leaderboard
    pub backend: StoreBackend,

    /// Redis configuration
    pub redis: RedisConfig,

    /// Logging level
    pub log_level: String,

    /// CORS allowed origins
    pub cors_origins: Vec<String>,
}

/// Store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Redis,
    /// Process-local store; data is lost on exit.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown store backend '{other}', expected 'redis' or 'memory'"),
        }
    }
}

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub pool_size: usize,
    pub acquire_timeout: Duration,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl RedisConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            capacity: self.pool_size,
            acquire_timeout: self.acquire_timeout,
            connect_timeout: self.connect_timeout,
            command_timeout: self.command_timeout,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Fails when a variable is set to a value that does not parse.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    ///
    /// # Errors
    ///
    /// Fails when a variable is set to a value that does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = PoolConfig::default();

        let pool_size = parsed(&lookup, "REDIS_POOL_SIZE")?.unwrap_or(defaults.capacity);
        if pool_size == 0 {
            bail!("REDIS_POOL_SIZE must be at least 1");
        }

        let cors_origins: Vec<String> = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();
        if cors_origins.is_empty() {
            bail!("Invalid CORS_ORIGINS: no origins listed, use '*' to allow any");
        }

        Ok(Self {
            server_addr: parsed(&lookup, "SERVER_ADDR")?
                .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 8080))),

            backend: parsed(&lookup, "STORE_BACKEND")?.unwrap_or(StoreBackend::Redis),

            redis: RedisConfig {
                url: lookup("REDIS_URL")
                    .or_else(|| lookup("REDISTOGO_URL"))
                    .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string()),
                pool_size,
                acquire_timeout: millis(&lookup, "REDIS_ACQUIRE_TIMEOUT_MS")?
                    .unwrap_or(defaults.acquire_timeout),
                connect_timeout: millis(&lookup, "REDIS_CONNECT_TIMEOUT_MS")?
                    .unwrap_or(defaults.connect_timeout),
                command_timeout: millis(&lookup, "REDIS_COMMAND_TIMEOUT_MS")?
                    .unwrap_or(defaults.command_timeout),
            },

            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            cors_origins,
        })
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("{e}"))
                .with_context(|| format!("Invalid {key} '{raw}'"))
        })
        .transpose()
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> anyhow::Result<Option<Duration>> {
    Ok(parsed::<u64>(lookup, key)?.map(Duration::from_millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.server_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.backend, StoreBackend::Redis);
        assert_eq!(config.redis.url, "redis://127.0.0.1:6379");
        assert_eq!(config.redis.pool_size, 10);
        assert_eq!(config.redis.acquire_timeout, Duration::from_secs(2));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.cors_origins, vec!["*".to_string()]);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("SERVER_ADDR", "127.0.0.1:9000"),
            ("STORE_BACKEND", "Memory"),
            ("REDIS_URL", "redis://cache:6379/1"),
            ("REDIS_POOL_SIZE", "32"),
            ("REDIS_COMMAND_TIMEOUT_MS", "250"),
            ("CORS_ORIGINS", "https://a.example, https://b.example"),
        ])
        .unwrap();
        assert_eq!(config.server_addr.port(), 9000);
        assert_eq!(config.backend, StoreBackend::Memory);
        assert_eq!(config.redis.url, "redis://cache:6379/1");
        let pool = config.redis.pool_config();
        assert_eq!(pool.capacity, 32);
        assert_eq!(pool.command_timeout, Duration::from_millis(250));
        assert_eq!(config.cors_origins, ["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_redistogo_fallback() {
        let config = load(&[("REDISTOGO_URL", "redis://legacy:6379")]).unwrap();
        assert_eq!(config.redis.url, "redis://legacy:6379");

        let config = load(&[
            ("REDISTOGO_URL", "redis://legacy:6379"),
            ("REDIS_URL", "redis://primary:6379"),
        ])
        .unwrap();
        assert_eq!(config.redis.url, "redis://primary:6379");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = load(&[("REDIS_POOL_SIZE", "lots")]).unwrap_err();
        assert!(err.to_string().contains("REDIS_POOL_SIZE"));
        assert!(load(&[("REDIS_POOL_SIZE", "0")]).is_err());
        assert!(load(&[("SERVER_ADDR", "nowhere")]).is_err());
        assert!(load(&[("STORE_BACKEND", "postgres")]).is_err());
    }

    #[test]
    fn test_empty_cors_origins_rejected() {
        for raw in ["", " ", " , "] {
            let err = load(&[("CORS_ORIGINS", raw)]).unwrap_err();
            assert!(err.to_string().contains("CORS_ORIGINS"));
        }
    }
}
