//! Startup connections to PostgreSQL and Redis with retry.

use std::future::Future;
use std::time::Duration;

use core_config::database::DatabaseConfig;
use core_config::redis::RedisConfig;
use redis::aio::ConnectionManager;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use tracing::{debug, info, log::LevelFilter, warn};

const INITIAL_DELAY: Duration = Duration::from_millis(200);
const MAX_DELAY: Duration = Duration::from_secs(5);

/// Redis handles: the client opens pub/sub connections, the manager serves commands
#[derive(Clone)]
pub struct RedisConnections {
    pub client: redis::Client,
    pub manager: ConnectionManager,
}

/// Retry an async operation with exponential backoff and jitter.
///
/// `attempts` counts the first try; zero behaves like one.
pub async fn retry_with_backoff<F, Fut, T, E>(
    what: &str,
    attempts: u32,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 0;
    let mut delay = INITIAL_DELAY;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!("{} connected after {} attempts", what, attempt);
                }
                return Ok(result);
            }
            Err(e) if attempt >= attempts => {
                warn!("{} connection failed after {} attempts: {}", what, attempt, e);
                return Err(e);
            }
            Err(e) => {
                let wait = apply_jitter(delay);
                debug!(
                    "{} connection failed (attempt {}/{}): {}. Retrying in {:?}",
                    what, attempt, attempts, e, wait
                );
                tokio::time::sleep(wait).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Between 50% and 100% of `delay`
fn apply_jitter(delay: Duration) -> Duration {
    use std::collections::hash_map::RandomState;
    use std::hash::BuildHasher;

    let spread = RandomState::new().hash_one(std::time::SystemTime::now()) % 50;
    let factor = spread as f64 / 100.0 + 0.5;
    delay.mul_f64(factor)
}

fn connect_options(config: &DatabaseConfig) -> ConnectOptions {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(true)
        .sqlx_logging_level(LevelFilter::Debug);
    options
}

/// Connect to PostgreSQL, retrying up to `config.connect_attempts` times
pub async fn postgres(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let db = retry_with_backoff("PostgreSQL", config.connect_attempts, || {
        Database::connect(connect_options(config))
    })
    .await?;

    info!("Successfully connected to PostgreSQL database");
    Ok(db)
}

/// Connect to Redis, retrying up to `attempts` times
pub async fn redis(config: &RedisConfig, attempts: u32) -> redis::RedisResult<RedisConnections> {
    let client = redis::Client::open(config.url.as_str())?;

    let manager = retry_with_backoff("Redis", attempts, || ConnectionManager::new(client.clone()))
        .await?;

    info!("Successfully connected to Redis");
    Ok(RedisConnections { client, manager })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let calls = AtomicU32::new(0);

        let result: Result<u32, String> = retry_with_backoff("test", 5, || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(format!("attempt {n} refused"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry_with_backoff("test", 2, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down".to_string()) }
        })
        .await;

        assert_eq!(result.unwrap_err(), "down");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);

        let result: Result<(), String> = retry_with_backoff("test", 0, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("down".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        for _ in 0..20 {
            let wait = apply_jitter(Duration::from_millis(1000));
            assert!(wait >= Duration::from_millis(500));
            assert!(wait <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn test_connect_options_use_pool_size() {
        let mut config = DatabaseConfig::new("postgres://localhost/pricing".to_string());
        config.max_connections = 7;
        let options = connect_options(&config);
        assert_eq!(options.get_max_connections(), Some(7));
        assert_eq!(options.get_url(), "postgres://localhost/pricing");
    }
}
