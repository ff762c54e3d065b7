use crate::{ConfigError, FromEnv, env_parse_or, env_required};

/// PostgreSQL connection settings for the settings store and catalog tables
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Attempts made before startup gives up on the database
    pub connect_attempts: u32,
}

impl DatabaseConfig {
    pub fn new(url: String) -> Self {
        Self {
            url,
            max_connections: 10,
            connect_attempts: 5,
        }
    }
}

impl FromEnv for DatabaseConfig {
    /// Requires DATABASE_URL. DATABASE_MAX_CONNECTIONS and
    /// DATABASE_CONNECT_ATTEMPTS default to 10 and 5.
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_required("DATABASE_URL")?,
            max_connections: env_parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            connect_attempts: env_parse_or("DATABASE_CONNECT_ATTEMPTS", 5)?,
        })
    }
}
