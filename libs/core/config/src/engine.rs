use std::time::Duration;

use crate::{ConfigError, FromEnv, env_parse_or};

/// Cache lifetimes and upstream timeouts for the pricing engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a cached recipe cost is served as fresh
    pub cost_cache_ttl: Duration,
    /// How long resolved tenant settings are reused before rereading the store
    pub settings_cache_ttl: Duration,
    /// Bound on every settings store and catalog call
    pub upstream_timeout: Duration,
    /// Cost entries untouched for longer than this are purged
    pub cache_retention: Duration,
    pub purge_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cost_cache_ttl: Duration::from_secs(300),
            settings_cache_ttl: Duration::from_secs(30),
            upstream_timeout: Duration::from_millis(800),
            cache_retention: Duration::from_secs(3600),
            purge_interval: Duration::from_secs(60),
        }
    }
}

impl FromEnv for EngineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            cost_cache_ttl: Duration::from_secs(env_parse_or(
                "PRICING_COST_CACHE_TTL_SECS",
                defaults.cost_cache_ttl.as_secs(),
            )?),
            settings_cache_ttl: Duration::from_secs(env_parse_or(
                "PRICING_SETTINGS_CACHE_TTL_SECS",
                defaults.settings_cache_ttl.as_secs(),
            )?),
            upstream_timeout: Duration::from_millis(env_parse_or(
                "PRICING_UPSTREAM_TIMEOUT_MS",
                defaults.upstream_timeout.as_millis() as u64,
            )?),
            cache_retention: Duration::from_secs(env_parse_or(
                "PRICING_CACHE_RETENTION_SECS",
                defaults.cache_retention.as_secs(),
            )?),
            purge_interval: Duration::from_secs(env_parse_or(
                "PRICING_CACHE_PURGE_INTERVAL_SECS",
                defaults.purge_interval.as_secs(),
            )?),
        };

        if config.upstream_timeout.is_zero() {
            return Err(ConfigError::ParseError {
                key: "PRICING_UPSTREAM_TIMEOUT_MS".to_string(),
                details: "must be greater than zero".to_string(),
            });
        }
        if config.purge_interval.is_zero() {
            return Err(ConfigError::ParseError {
                key: "PRICING_CACHE_PURGE_INTERVAL_SECS".to_string(),
                details: "must be greater than zero".to_string(),
            });
        }

        Ok(config)
    }
}
