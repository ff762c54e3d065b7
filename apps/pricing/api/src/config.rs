use core_config::database::DatabaseConfig;
use core_config::engine::EngineConfig;
use core_config::redis::RedisConfig;
use core_config::{AppInfo, FromEnv, app_info, env_parse_or, server::ServerConfig};
use domain_pricing::EngineSettings;

pub use core_config::Environment;

/// Application-specific configuration
/// Composes shared config components from the `core_config` library
#[derive(Clone, Debug)]
pub struct Config {
    pub app: AppInfo,
    pub database: DatabaseConfig,
    /// Absent when REDIS_URL is unset; the cost cache then stays in process
    pub redis: Option<RedisConfig>,
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub environment: Environment,
    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> eyre::Result<Self> {
        let environment = Environment::from_env();
        let database = DatabaseConfig::from_env()?; // Required - will fail if not set
        let redis = RedisConfig::from_env_optional()?;
        let server = ServerConfig::from_env()?; // Uses defaults: HOST=0.0.0.0, PORT=8080
        let engine = EngineConfig::from_env()?;
        let run_migrations = env_parse_or("RUN_MIGRATIONS", true)?;

        Ok(Self {
            app: app_info!(),
            database,
            redis,
            server,
            engine,
            environment,
            run_migrations,
        })
    }

    /// Timing knobs handed to the pricing engine
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            cost_cache_ttl: self.engine.cost_cache_ttl,
            settings_cache_ttl: self.engine.settings_cache_ttl,
            upstream_timeout: self.engine.upstream_timeout,
        }
    }
}
