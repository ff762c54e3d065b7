use std::env;

use crate::{ConfigError, FromEnv, env_required};

/// Redis settings for the shared cost cache and invalidation channel
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub url: String,
}

impl RedisConfig {
    pub fn new(url: String) -> Self {
        Self { url }
    }

    /// Redis is optional: without REDIS_URL the service keeps its cost
    /// cache in process and receives no invalidation events.
    pub fn from_env_optional() -> Result<Option<Self>, ConfigError> {
        match env::var("REDIS_URL") {
            Ok(url) if !url.trim().is_empty() => Ok(Some(Self::new(url.trim().to_string()))),
            _ => Ok(None),
        }
    }
}

impl FromEnv for RedisConfig {
    /// Requires REDIS_URL to be set (no default)
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_required("REDIS_URL")?,
        })
    }
}
