use std::sync::Arc;
use std::time::Duration;

use domain_pricing::{Catalog, PricingService, SettingsStore};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Periodically drop cost cache keys untouched for longer than `retention`
pub async fn run_cache_purge<S, C>(
    service: Arc<PricingService<S, C>>,
    every: Duration,
    retention: Duration,
    mut shutdown: broadcast::Receiver<()>,
) where
    S: SettingsStore + 'static,
    C: Catalog + 'static,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; nothing is old enough yet.
    ticker.tick().await;

    info!(every = ?every, retention = ?retention, "Cost cache purge scheduled");

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => match service.purge_expired(retention).await {
                Ok(0) => {}
                Ok(purged) => debug!(purged, "Purged expired cost cache entries"),
                Err(e) => warn!(error = %e, "Cost cache purge failed"),
            },
        }
    }

    info!("Cost cache purge stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_pricing::{
        CacheKey, EngineSettings, InMemoryCatalog, InMemoryResultCache, InMemorySettingsStore,
        ResultCache,
    };
    use uuid::Uuid;

    #[tokio::test]
    async fn test_purge_runs_until_shutdown() {
        let cache = Arc::new(InMemoryResultCache::new());
        cache
            .invalidate(&CacheKey::new(Uuid::now_v7(), Uuid::now_v7()), 1)
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);

        let service = Arc::new(PricingService::new(
            InMemorySettingsStore::default(),
            InMemoryCatalog::default(),
            cache.clone(),
            EngineSettings::default(),
        ));

        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(run_cache_purge(
            service,
            Duration::from_millis(10),
            Duration::ZERO,
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cache.is_empty());

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("purge task did not stop")
            .unwrap();
    }
}
