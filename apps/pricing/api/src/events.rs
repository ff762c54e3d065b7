//! Cost invalidation listener.
//!
//! Subscribes to the Redis pub/sub channel the catalog publishes on and feeds
//! each event to the pricing service. A lost subscription is re-established
//! with a delay; since events may have been missed meanwhile, the cost cache
//! is cleared after every resubscribe.

use std::sync::Arc;
use std::time::Duration;

use domain_pricing::{
    Catalog, INVALIDATION_CHANNEL, InvalidationEvent, PricingService, SettingsStore,
};
use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Parse and apply one pub/sub payload.
///
/// Returns the number of recipes invalidated; malformed payloads count as zero.
/// An event that cannot be applied clears the whole cost cache instead, so the
/// pre-change cost is never served again.
pub async fn handle_payload<S, C>(service: &PricingService<S, C>, payload: &str) -> usize
where
    S: SettingsStore,
    C: Catalog,
{
    let event: InvalidationEvent = match serde_json::from_str(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, payload, "Ignoring malformed invalidation event");
            return 0;
        }
    };

    match service.apply_invalidation(&event).await {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, kind = event.kind(), "Failed to apply invalidation event");
            match service.clear_cache().await {
                Ok(()) => info!("Cleared cost cache in place of the failed invalidation"),
                Err(e) => {
                    error!(error = %e, "Failed to clear cost cache, stale costs may be served")
                }
            }
            0
        }
    }
}

/// Listen for invalidation events until shutdown is broadcast
pub async fn run_invalidation_listener<S, C>(
    client: redis::Client,
    service: Arc<PricingService<S, C>>,
    mut shutdown: broadcast::Receiver<()>,
) where
    S: SettingsStore + 'static,
    C: Catalog + 'static,
{
    let mut resubscribing = false;

    loop {
        let outcome = tokio::select! {
            _ = shutdown.recv() => break,
            outcome = listen(&client, &service, resubscribing) => outcome,
        };

        match outcome {
            Ok(()) => warn!("Invalidation subscription closed by server, reconnecting"),
            Err(e) => warn!(error = %e, "Invalidation subscription failed, reconnecting"),
        }
        resubscribing = true;

        tokio::select! {
            _ = shutdown.recv() => break,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }

    info!("Invalidation listener stopped");
}

async fn listen<S, C>(
    client: &redis::Client,
    service: &PricingService<S, C>,
    resubscribing: bool,
) -> redis::RedisResult<()>
where
    S: SettingsStore,
    C: Catalog,
{
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(INVALIDATION_CHANNEL).await?;
    info!(channel = INVALIDATION_CHANNEL, "Subscribed to cost invalidations");

    if resubscribing {
        match service.clear_cache().await {
            Ok(()) => info!("Cleared cost cache after resubscribing"),
            Err(e) => warn!(error = %e, "Failed to clear cost cache after resubscribing"),
        }
    }

    let mut messages = pubsub.on_message();
    while let Some(message) = messages.next().await {
        let payload: String = match message.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Ignoring non-text invalidation payload");
                continue;
            }
        };

        let invalidated = handle_payload(service, &payload).await;
        debug!(invalidated, "Processed invalidation payload");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domain_pricing::{
        EngineSettings, InMemoryCatalog, InMemoryResultCache, InMemorySettingsStore, Ingredient,
        PricingError, PricingResult, PricingSuggestionInput, Product, Recipe, RecipeItem, Unit,
    };
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    /// Catalog whose reverse ingredient lookup is down
    struct NoReverseLookup(InMemoryCatalog);

    #[async_trait]
    impl Catalog for NoReverseLookup {
        async fn recipe(&self, tenant_id: Uuid, recipe_id: Uuid) -> PricingResult<Option<Recipe>> {
            self.0.recipe(tenant_id, recipe_id).await
        }

        async fn ingredients(
            &self,
            tenant_id: Uuid,
            ingredient_ids: Vec<Uuid>,
        ) -> PricingResult<Vec<Ingredient>> {
            self.0.ingredients(tenant_id, ingredient_ids).await
        }

        async fn product(
            &self,
            tenant_id: Uuid,
            product_id: Uuid,
        ) -> PricingResult<Option<Product>> {
            self.0.product(tenant_id, product_id).await
        }

        async fn recipes_using_ingredient(
            &self,
            _tenant_id: Uuid,
            _ingredient_id: Uuid,
        ) -> PricingResult<Vec<Uuid>> {
            Err(PricingError::UpstreamUnavailable("catalog timed out".to_string()))
        }
    }

    fn flour(tenant: Uuid, id: Uuid, unit_cost: rust_decimal::Decimal) -> Ingredient {
        Ingredient {
            id,
            tenant_id: tenant,
            name: "flour".to_string(),
            unit: Unit::Kilogram,
            unit_cost,
        }
    }

    struct Fixture {
        service: PricingService<InMemorySettingsStore, InMemoryCatalog>,
        tenant: Uuid,
        flour: Uuid,
    }

    async fn fixture() -> Fixture {
        let tenant = Uuid::now_v7();
        let flour = Uuid::now_v7();
        let catalog = InMemoryCatalog::default();

        catalog.put_ingredient(self::flour(tenant, flour, dec!(5))).await;
        for name in ["bread", "focaccia"] {
            catalog.put_recipe(Recipe {
                id: Uuid::now_v7(),
                tenant_id: tenant,
                name: name.to_string(),
                yield_quantity: dec!(10),
                production_time_minutes: dec!(30),
                items: vec![RecipeItem {
                    ingredient_id: flour,
                    quantity: dec!(500),
                    unit: Unit::Gram,
                    waste_factor: dec!(0),
                }],
            })
            .await;
        }

        let service = PricingService::new(
            InMemorySettingsStore::default(),
            catalog,
            Arc::new(InMemoryResultCache::new()),
            EngineSettings::default(),
        );

        Fixture {
            service,
            tenant,
            flour,
        }
    }

    #[tokio::test]
    async fn test_ingredient_event_fans_out_to_recipes() {
        let f = fixture().await;
        let payload = format!(
            r#"{{"type":"ingredient_price_changed","tenant_id":"{}","ingredient_id":"{}","version":3}}"#,
            f.tenant, f.flour
        );

        assert_eq!(handle_payload(&f.service, &payload).await, 2);
    }

    #[tokio::test]
    async fn test_recipe_event_invalidates_one_recipe() {
        let f = fixture().await;
        let payload = format!(
            r#"{{"type":"recipe_items_changed","tenant_id":"{}","recipe_id":"{}","version":1}}"#,
            f.tenant,
            Uuid::now_v7()
        );

        assert_eq!(handle_payload(&f.service, &payload).await, 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_ignored() {
        let f = fixture().await;

        assert_eq!(handle_payload(&f.service, "not json").await, 0);
        assert_eq!(
            handle_payload(&f.service, r#"{"type":"price_exploded"}"#).await,
            0
        );
    }

    #[tokio::test]
    async fn test_failed_invalidation_still_drops_old_cost() {
        let tenant = Uuid::now_v7();
        let flour_id = Uuid::now_v7();
        let catalog = InMemoryCatalog::default();
        catalog.put_ingredient(flour(tenant, flour_id, dec!(5))).await;

        let recipe_id = Uuid::now_v7();
        catalog
            .put_recipe(Recipe {
                id: recipe_id,
                tenant_id: tenant,
                name: "bread".to_string(),
                yield_quantity: dec!(10),
                production_time_minutes: dec!(30),
                items: vec![RecipeItem {
                    ingredient_id: flour_id,
                    quantity: dec!(500),
                    unit: Unit::Gram,
                    waste_factor: dec!(0),
                }],
            })
            .await;

        let cache = Arc::new(InMemoryResultCache::new());
        let service = PricingService::new(
            InMemorySettingsStore::default(),
            NoReverseLookup(catalog.clone()),
            cache.clone(),
            EngineSettings::default(),
        );
        let input = PricingSuggestionInput {
            recipe_id: Some(recipe_id),
            ..Default::default()
        };

        let before = service.suggest(tenant, input.clone()).await.unwrap();
        assert_eq!(before.components.ingredient_cost, dec!(2.5));
        assert!(!cache.is_empty());

        catalog.put_ingredient(flour(tenant, flour_id, dec!(9))).await;
        let payload = format!(
            r#"{{"type":"ingredient_price_changed","tenant_id":"{tenant}","ingredient_id":"{flour_id}","version":2}}"#
        );
        assert_eq!(handle_payload(&service, &payload).await, 0);

        let after = service.suggest(tenant, input).await.unwrap();
        assert_eq!(after.components.ingredient_cost, dec!(4.5));
    }
}
