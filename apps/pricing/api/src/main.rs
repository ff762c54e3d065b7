//! Pricing API - per-tenant settings and price suggestions over HTTP

use std::sync::Arc;

use core_config::tracing::{init_tracing, install_color_eyre};
use domain_pricing::{
    InMemoryResultCache, PgCatalog, PgSettingsStore, PricingService, RedisResultCache, ResultCache,
};
use eyre::WrapErr;
use migration::{Migrator, MigratorTrait};
use tracing::info;

mod api;
mod config;
mod connect;
mod events;
mod jobs;
mod openapi;
mod server;
mod shutdown;
mod state;

use config::Config;
use shutdown::ShutdownCoordinator;
use state::AppState;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Install color-eyre first for colored error output (before any fallible operations)
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);
    observability::init_metrics().wrap_err("Failed to install Prometheus recorder")?;

    let db = connect::postgres(&config.database)
        .await
        .wrap_err("PostgreSQL connection failed")?;

    if config.run_migrations {
        Migrator::up(&db, None)
            .await
            .wrap_err("Failed to run database migrations")?;
        info!("Database migrations applied");
    }

    let redis = match &config.redis {
        Some(redis_config) => Some(
            connect::redis(redis_config, config.database.connect_attempts)
                .await
                .wrap_err("Redis connection failed")?,
        ),
        None => {
            info!("REDIS_URL not set, keeping the cost cache in process");
            None
        }
    };

    let cache: Arc<dyn ResultCache> = match &redis {
        Some(redis) => Arc::new(RedisResultCache::new(
            redis.manager.clone(),
            config.engine.cache_retention,
        )),
        None => Arc::new(InMemoryResultCache::new()),
    };
    let shared_cache = redis.is_some();

    let service = Arc::new(PricingService::new(
        PgSettingsStore::new(db.clone()),
        PgCatalog::new(db.clone()),
        cache,
        config.engine_settings(),
    ));

    let (coordinator, _rx) = ShutdownCoordinator::new();
    let mut background = vec![tokio::spawn(jobs::run_cache_purge(
        service.clone(),
        config.engine.purge_interval,
        config.engine.cache_retention,
        coordinator.subscribe(),
    ))];

    if let Some(redis) = &redis {
        background.push(tokio::spawn(events::run_invalidation_listener(
            redis.client.clone(),
            service.clone(),
            coordinator.subscribe(),
        )));
    }

    let state = AppState {
        config,
        db,
        redis: redis.map(|r| r.manager),
        service,
    };

    let router = server::create_router::<openapi::ApiDoc>(api::routes(&state));
    let app = router.merge(api::health::router(state.clone()));

    info!("Starting pricing API");

    let server_config = state.config.server.clone();
    server::serve(app, &server_config, coordinator, async move {
        for task in background {
            if let Err(e) = task.await {
                tracing::error!("Background task failed: {}", e);
            }
        }

        // A shared cache outlives this replica; only the in-process one is ours to drop.
        if !shared_cache {
            match state.service.clear_cache().await {
                Ok(()) => info!("Cost cache cleared"),
                Err(e) => tracing::error!("Error clearing cost cache: {}", e),
            }
        }

        match state.db.close().await {
            Ok(_) => info!("PostgreSQL connection closed successfully"),
            Err(e) => tracing::error!("Error closing PostgreSQL: {}", e),
        }
    })
    .await
    .wrap_err("Server error")?;

    info!("Pricing API shutdown complete");
    Ok(())
}
