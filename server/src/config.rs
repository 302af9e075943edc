//! Service configuration.

use std::time::Duration;

use clap::ValueEnum;
use fxgate_fx::BatchConfig;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    InvalidVar { var: String, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Cache backend connection settings.
#[derive(Debug, Clone)]
pub struct CacheBackendConfig {
    /// Redis host. Unset selects the in-process store.
    pub host: Option<String>,
    pub port: u16,
    pub db: i64,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl: bool,
    /// Connect and per-operation timeout.
    pub timeout: Duration,
}

impl Default for CacheBackendConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: 6379,
            db: 0,
            username: None,
            password: None,
            ssl: false,
            timeout: Duration::from_secs(5),
        }
    }
}

/// Upstream exchange-rate API settings.
#[derive(Debug, Clone)]
pub struct UpstreamApiConfig {
    /// Latest-rates endpoint.
    pub url: String,
    /// Access key.
    pub api_key: Option<String>,
    /// Fetch timeout.
    pub timeout: Duration,
}

impl Default for UpstreamApiConfig {
    fn default() -> Self {
        Self {
            url: "https://api.exchangeratesapi.io/v1/latest".to_string(),
            api_key: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Main service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Display name.
    pub service_name: String,
    /// Listen address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Log level, used when `RUST_LOG` is unset.
    pub log_level: String,
    pub log_format: LogFormat,
    pub cache: CacheBackendConfig,
    /// Lifetime of cached rate snapshots.
    pub cache_ttl: Duration,
    pub upstream: UpstreamApiConfig,
    pub batch: BatchConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: "Currency Conversion API".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            log_level: "info".to_string(),
            log_format: LogFormat::Json,
            cache: CacheBackendConfig::default(),
            cache_ttl: Duration::from_secs(1800),
            upstream: UpstreamApiConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = var("SVC_NAME") {
            config.service_name = name;
        }
        if let Some(host) = var("SVC_HOST") {
            config.host = host;
        }
        if let Some(port) = var("SVC_PORT") {
            config.port = parse_var("SVC_PORT", &port)?;
        }
        if let Some(level) = var("LOG_LEVEL") {
            config.log_level = level.to_lowercase();
        }
        if let Some(format) = var("LOG_FORMAT") {
            config.log_format = LogFormat::from_str(&format, true).map_err(|_| {
                ConfigError::InvalidVar {
                    var: "LOG_FORMAT".to_string(),
                    value: format.clone(),
                }
            })?;
        }

        config.cache.host = var("REDIS_HOST");
        if let Some(port) = var("REDIS_PORT") {
            config.cache.port = parse_var("REDIS_PORT", &port)?;
        }
        if let Some(db) = var("REDIS_DB") {
            config.cache.db = parse_var("REDIS_DB", &db)?;
        }
        config.cache.username = var("REDIS_USERNAME");
        config.cache.password = var("REDIS_PASSWORD");
        if let Some(ssl) = var("REDIS_SSL") {
            config.cache.ssl = parse_bool("REDIS_SSL", &ssl)?;
        }
        if let Some(timeout) = var("REDIS_TIMEOUT") {
            config.cache.timeout = parse_secs("REDIS_TIMEOUT", &timeout)?;
        }
        if let Some(ttl) = var("CACHE_TTL_SECONDS") {
            config.cache_ttl = Duration::from_secs(parse_var("CACHE_TTL_SECONDS", &ttl)?);
        }

        if let Some(url) = var("EXCHANGE_RATES_API") {
            config.upstream.url = url;
        }
        config.upstream.api_key = var("EXCHANGE_RATES_API_KEY");
        if let Some(timeout) = var("EXCHANGE_RATES_TIMEOUT") {
            config.upstream.timeout = parse_secs("EXCHANGE_RATES_TIMEOUT", &timeout)?;
        }

        if let Some(size) = var("BATCH_MAX_SIZE") {
            config.batch.max_batch_size = parse_var("BATCH_MAX_SIZE", &size)?;
        }
        if let Some(concurrency) = var("BATCH_CONCURRENCY") {
            config.batch.concurrency = parse_var("BATCH_CONCURRENCY", &concurrency)?;
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("Listen port cannot be 0".to_string()));
        }

        if self.cache_ttl.is_zero() {
            return Err(ConfigError::Invalid("Cache TTL must be positive".to_string()));
        }

        if self.cache.timeout.is_zero() || self.upstream.timeout.is_zero() {
            return Err(ConfigError::Invalid("Timeouts must be positive".to_string()));
        }

        if self.upstream.url.trim().is_empty() {
            return Err(ConfigError::Invalid("Exchange rates API URL cannot be empty".to_string()));
        }

        if self.batch.max_batch_size == 0 || self.batch.concurrency == 0 {
            return Err(ConfigError::Invalid("Batch limits must be positive".to_string()));
        }

        Ok(())
    }

    /// Socket address to bind.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether a Redis backend was requested.
    pub fn redis_requested(&self) -> bool {
        self.cache.host.is_some()
    }
}

fn parse_var<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidVar {
        var: var.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidVar {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Seconds, fractional allowed.
fn parse_secs(var: &str, value: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_var(var, value)?;
    Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidVar {
        var: var.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_vars(vars: &[(&str, &str)]) -> Result<ServiceConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 8000);
        assert_eq!(config.cache_ttl, Duration::from_secs(1800));
        assert!(!config.redis_requested());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = ServiceConfig::default();
        config.port = 0;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.cache_ttl = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = ServiceConfig::default();
        config.batch.concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = from_vars(&[
            ("SVC_PORT", "9000"),
            ("LOG_FORMAT", "Pretty"),
            ("REDIS_HOST", "cache.internal"),
            ("REDIS_SSL", "true"),
            ("REDIS_TIMEOUT", "0.5"),
            ("CACHE_TTL_SECONDS", "60"),
            ("EXCHANGE_RATES_API_KEY", "secret"),
            ("BATCH_MAX_SIZE", "10"),
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.cache.host.as_deref(), Some("cache.internal"));
        assert!(config.cache.ssl);
        assert_eq!(config.cache.timeout, Duration::from_millis(500));
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.upstream.api_key.as_deref(), Some("secret"));
        assert_eq!(config.batch.max_batch_size, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_vars_are_ignored() {
        let config = from_vars(&[("REDIS_HOST", "  "), ("SVC_NAME", "")]).unwrap();
        assert!(config.cache.host.is_none());
        assert_eq!(config.service_name, "Currency Conversion API");
    }

    #[test]
    fn test_malformed_vars_rejected() {
        let err = from_vars(&[("SVC_PORT", "eighty")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidVar {
                var: "SVC_PORT".to_string(),
                value: "eighty".to_string(),
            }
        );

        assert!(from_vars(&[("REDIS_TIMEOUT", "-1")]).is_err());
        assert!(from_vars(&[("REDIS_SSL", "maybe")]).is_err());
        assert!(from_vars(&[("LOG_FORMAT", "xml")]).is_err());
    }
}
