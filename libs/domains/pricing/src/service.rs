use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use observability::{PricingMetrics, SuggestionTimer};

use crate::aggregator::{CostAggregator, CostInputs};
use crate::cache::ResultCache;
use crate::calculator;
use crate::catalog::{Catalog, Product};
use crate::error::{PricingError, PricingResult};
use crate::events::InvalidationEvent;
use crate::models::{
    PricingSettings, PricingSuggestion, PricingSuggestionInput, SettingsLayer, SuggestionTerms,
    UpdatePricingSettings,
};
use crate::resolver::{SettingsResolver, ensure_tenant};
use crate::store::SettingsStore;

/// Timing knobs of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// How long a computed cost basis is served without recomputation
    pub cost_cache_ttl: Duration,
    /// How long stored tenant settings are reused without a store read
    pub settings_cache_ttl: Duration,
    /// Upper bound for a single settings store or catalog call
    pub upstream_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cost_cache_ttl: Duration::from_secs(300),
            settings_cache_ttl: Duration::from_secs(30),
            upstream_timeout: Duration::from_millis(800),
        }
    }
}

/// Service for tenant pricing settings and price suggestions
pub struct PricingService<S: SettingsStore, C: Catalog> {
    resolver: SettingsResolver<S>,
    aggregator: CostAggregator<C>,
    cache: Arc<dyn ResultCache>,
}

impl<S: SettingsStore, C: Catalog> PricingService<S, C> {
    /// Create a new pricing service. The cache is owned by the caller, which
    /// is also responsible for purging and clearing it.
    pub fn new(
        store: S,
        catalog: C,
        cache: Arc<dyn ResultCache>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            resolver: SettingsResolver::new(
                Arc::new(store),
                settings.settings_cache_ttl,
                settings.upstream_timeout,
            ),
            aggregator: CostAggregator::new(
                Arc::new(catalog),
                cache.clone(),
                settings.cost_cache_ttl,
                settings.upstream_timeout,
            ),
            cache,
        }
    }

    /// Get the tenant's settings with defaults applied
    pub async fn get_settings(&self, tenant_id: Uuid) -> PricingResult<PricingSettings> {
        self.resolver.settings(tenant_id).await
    }

    /// Partially update the tenant's settings
    pub async fn update_settings(
        &self,
        tenant_id: Uuid,
        patch: UpdatePricingSettings,
    ) -> PricingResult<PricingSettings> {
        let settings = self.resolver.upsert(tenant_id, &patch).await?;
        info!(tenant_id = %tenant_id, "Updated pricing settings");
        Ok(settings)
    }

    /// Suggest a price for a recipe or product
    #[instrument(
        skip(self, input),
        fields(
            tenant_id = %tenant_id,
            recipe_id = tracing::field::Empty,
            product_id = tracing::field::Empty
        )
    )]
    pub async fn suggest(
        &self,
        tenant_id: Uuid,
        input: PricingSuggestionInput,
    ) -> PricingResult<PricingSuggestion> {
        let timer = SuggestionTimer::start();

        ensure_tenant(tenant_id)?;
        input.validate()?;

        let product = match input.product_id {
            Some(product_id) => Some(self.aggregator.product(tenant_id, product_id).await?),
            None => None,
        };
        let recipe_id = target_recipe(input.recipe_id, product.as_ref())?;

        let span = tracing::Span::current();
        span.record("recipe_id", tracing::field::display(recipe_id));
        if let Some(product_id) = input.product_id {
            span.record("product_id", tracing::field::display(product_id));
        }

        // Request overrides, then the product's own values, then tenant settings.
        let product_layer = product
            .as_ref()
            .map(|p| SettingsLayer {
                packaging_cost: p.packaging_cost,
                margin_percent: p.margin_percent,
                ..Default::default()
            })
            .unwrap_or_default();
        let overrides = input.overrides().over(&product_layer);

        let resolved = self.resolver.resolve(tenant_id, &overrides).await?;
        let effective = resolved.effective;

        let snapshot = self
            .aggregator
            .aggregate_cost(
                tenant_id,
                recipe_id,
                &CostInputs {
                    labor_cost_per_minute: effective.labor_cost_per_minute,
                    packaging_cost: effective.packaging_cost,
                },
            )
            .await?;

        let terms = SuggestionTerms {
            include_tax: input.include_tax,
            current_price: input
                .current_price
                .or_else(|| product.as_ref().and_then(|p| p.sale_price)),
        };

        let mut suggestion = calculator::suggest(&effective, &snapshot, &terms)?;
        suggestion.recipe_id = Some(recipe_id);
        suggestion.product_id = input.product_id;
        suggestion.flags.stale_settings = resolved.stale;

        let duration_ms = timer.success();
        info!(
            suggested_price = %suggestion.suggested_price,
            stale_settings = resolved.stale,
            duration_ms,
            "Computed price suggestion"
        );

        Ok(suggestion)
    }

    /// Apply a catalog change to the cost cache. Returns how many recipes were invalidated.
    #[instrument(skip(self), fields(kind = event.kind(), tenant_id = %event.tenant_id()))]
    pub async fn apply_invalidation(&self, event: &InvalidationEvent) -> PricingResult<usize> {
        let invalidated = match *event {
            InvalidationEvent::IngredientPriceChanged {
                tenant_id,
                ingredient_id,
                version,
            } => {
                self.aggregator
                    .invalidate_ingredient(tenant_id, ingredient_id, version)
                    .await?
            }
            InvalidationEvent::RecipeItemsChanged {
                tenant_id,
                recipe_id,
                version,
            } => {
                self.aggregator
                    .invalidate_recipe(tenant_id, recipe_id, version)
                    .await?;
                1
            }
        };

        PricingMetrics::record_invalidation(event.kind(), invalidated);
        info!(recipes = invalidated, "Applied cost invalidation");
        Ok(invalidated)
    }

    /// Drop cost cache keys untouched for longer than `retention`
    pub async fn purge_expired(&self, retention: Duration) -> PricingResult<usize> {
        let purged = self.cache.purge_expired(retention).await?;
        PricingMetrics::record_cache_purged(purged);
        Ok(purged)
    }

    /// Drop every cached cost basis
    pub async fn clear_cache(&self) -> PricingResult<()> {
        self.cache.clear().await
    }
}

/// Recipe to price: the product's recipe when a product is given, else the explicit one
fn target_recipe(recipe_id: Option<Uuid>, product: Option<&Product>) -> PricingResult<Uuid> {
    match (recipe_id, product) {
        (explicit, Some(product)) => {
            let linked = product.recipe_id.ok_or_else(|| {
                PricingError::validation("product_id", "product has no linked recipe")
            })?;

            match explicit {
                Some(explicit) if explicit != linked => Err(PricingError::validation(
                    "recipe_id",
                    "does not match the product's recipe",
                )),
                _ => Ok(linked),
            }
        }
        (Some(recipe_id), None) => Ok(recipe_id),
        (None, None) => Err(PricingError::validation(
            "recipe_id",
            "either recipe_id or product_id is required",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryResultCache;
    use crate::catalog::{InMemoryCatalog, Ingredient, MockCatalog, Recipe, RecipeItem};
    use crate::store::{InMemorySettingsStore, MockSettingsStore};
    use crate::units::Unit;
    use rust_decimal_macros::dec;

    struct Fixture {
        tenant: Uuid,
        recipe: Recipe,
        flour: Ingredient,
        catalog: InMemoryCatalog,
        store: InMemorySettingsStore,
    }

    /// One recipe costing 20.00 per batch of 10, 30 minutes of work
    async fn fixture() -> Fixture {
        let tenant = Uuid::now_v7();
        let flour = Ingredient {
            id: Uuid::now_v7(),
            tenant_id: tenant,
            name: "flour".to_string(),
            unit: Unit::Kilogram,
            unit_cost: dec!(5.00),
        };
        let recipe = Recipe {
            id: Uuid::now_v7(),
            tenant_id: tenant,
            name: "brioche".to_string(),
            yield_quantity: dec!(10),
            production_time_minutes: dec!(30),
            items: vec![RecipeItem {
                ingredient_id: flour.id,
                quantity: dec!(4),
                unit: Unit::Kilogram,
                waste_factor: dec!(0),
            }],
        };

        let catalog = InMemoryCatalog::new();
        catalog.put_ingredient(flour.clone()).await;
        catalog.put_recipe(recipe.clone()).await;

        Fixture {
            tenant,
            recipe,
            flour,
            catalog,
            store: InMemorySettingsStore::new(),
        }
    }

    fn service(fixture: &Fixture) -> PricingService<InMemorySettingsStore, InMemoryCatalog> {
        PricingService::new(
            fixture.store.clone(),
            fixture.catalog.clone(),
            Arc::new(InMemoryResultCache::new()),
            EngineSettings::default(),
        )
    }

    fn product(fixture: &Fixture) -> Product {
        Product {
            id: Uuid::now_v7(),
            tenant_id: fixture.tenant,
            name: "brioche".to_string(),
            recipe_id: Some(fixture.recipe.id),
            packaging_cost: Some(dec!(1.00)),
            margin_percent: Some(dec!(50)),
            sale_price: Some(dec!(4.00)),
        }
    }

    #[tokio::test]
    async fn test_suggest_with_defaults() {
        let fixture = fixture().await;
        let service = service(&fixture);

        let suggestion = service
            .suggest(
                fixture.tenant,
                PricingSuggestionInput {
                    recipe_id: Some(fixture.recipe.id),
                    packaging_cost: Some(dec!(0.4)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(suggestion.unit_cost, dec!(3.99));
        assert_eq!(suggestion.recipe_id, Some(fixture.recipe.id));
        assert!(suggestion.flags.missing_sales_volume);
        assert!(!suggestion.flags.stale_settings);
        assert_eq!(suggestion.inputs.settings.margin_percent, dec!(30.0));
    }

    #[tokio::test]
    async fn test_stored_settings_apply_to_suggestions() {
        let fixture = fixture().await;
        let service = service(&fixture);

        service
            .update_settings(
                fixture.tenant,
                UpdatePricingSettings {
                    default_margin_percent: Some(dec!(10)),
                    default_sales_volume: Some(dec!(100)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let suggestion = service
            .suggest(
                fixture.tenant,
                PricingSuggestionInput {
                    recipe_id: Some(fixture.recipe.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(suggestion.inputs.settings.margin_percent, dec!(10));
        assert!(suggestion.flags.low_margin);
        assert!(!suggestion.flags.missing_sales_volume);
    }

    #[tokio::test]
    async fn test_packaging_precedence() {
        let fixture = fixture().await;
        let service = service(&fixture);
        let product = product(&fixture);
        fixture.catalog.put_product(product.clone()).await;

        service
            .update_settings(
                fixture.tenant,
                UpdatePricingSettings {
                    default_packaging_cost: Some(dec!(0.70)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // Override beats the product's packaging
        let overridden = service
            .suggest(
                fixture.tenant,
                PricingSuggestionInput {
                    product_id: Some(product.id),
                    packaging_cost: Some(dec!(0.25)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(overridden.components.packaging_cost, dec!(0.25));

        // Product beats the tenant default
        let from_product = service
            .suggest(
                fixture.tenant,
                PricingSuggestionInput {
                    product_id: Some(product.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(from_product.components.packaging_cost, dec!(1.00));
        assert_eq!(from_product.inputs.settings.margin_percent, dec!(50));

        // Tenant default when the product has none
        let bare = Product {
            id: Uuid::now_v7(),
            packaging_cost: None,
            margin_percent: None,
            ..product.clone()
        };
        fixture.catalog.put_product(bare.clone()).await;

        let from_tenant = service
            .suggest(
                fixture.tenant,
                PricingSuggestionInput {
                    product_id: Some(bare.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(from_tenant.components.packaging_cost, dec!(0.70));
        assert_eq!(from_tenant.inputs.settings.margin_percent, dec!(30.0));
    }

    #[tokio::test]
    async fn test_current_price_request_beats_product() {
        let fixture = fixture().await;
        let service = service(&fixture);
        let product = product(&fixture);
        fixture.catalog.put_product(product.clone()).await;

        let from_product = service
            .suggest(
                fixture.tenant,
                PricingSuggestionInput {
                    product_id: Some(product.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(from_product.inputs.current_price, Some(dec!(4.00)));
        assert!(from_product.delta_vs_current.is_some());

        let from_request = service
            .suggest(
                fixture.tenant,
                PricingSuggestionInput {
                    product_id: Some(product.id),
                    current_price: Some(dec!(9.90)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(from_request.inputs.current_price, Some(dec!(9.90)));
    }

    #[tokio::test]
    async fn test_product_recipe_mismatch() {
        let fixture = fixture().await;
        let service = service(&fixture);
        let product = product(&fixture);
        fixture.catalog.put_product(product.clone()).await;

        let err = service
            .suggest(
                fixture.tenant,
                PricingSuggestionInput {
                    product_id: Some(product.id),
                    recipe_id: Some(Uuid::now_v7()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PricingError::Validation { ref field, .. } if field == "recipe_id"));
    }

    #[tokio::test]
    async fn test_product_without_recipe() {
        let fixture = fixture().await;
        let service = service(&fixture);
        let product = Product {
            recipe_id: None,
            ..product(&fixture)
        };
        fixture.catalog.put_product(product.clone()).await;

        let err = service
            .suggest(
                fixture.tenant,
                PricingSuggestionInput {
                    product_id: Some(product.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PricingError::Validation { ref field, .. } if field == "product_id"));
    }

    #[tokio::test]
    async fn test_unknown_product() {
        let fixture = fixture().await;
        let service = service(&fixture);

        let err = service
            .suggest(
                fixture.tenant,
                PricingSuggestionInput {
                    product_id: Some(Uuid::now_v7()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PricingError::NotFound { entity: "Product", .. }));
    }

    #[tokio::test]
    async fn test_invalidation_event_reprices_recipe() {
        let fixture = fixture().await;
        let service = service(&fixture);
        let input = PricingSuggestionInput {
            recipe_id: Some(fixture.recipe.id),
            ..Default::default()
        };

        let before = service.suggest(fixture.tenant, input.clone()).await.unwrap();
        assert_eq!(before.components.ingredient_cost, dec!(20));

        fixture
            .catalog
            .put_ingredient(Ingredient {
                unit_cost: dec!(6.00),
                ..fixture.flour.clone()
            })
            .await;

        let invalidated = service
            .apply_invalidation(&InvalidationEvent::IngredientPriceChanged {
                tenant_id: fixture.tenant,
                ingredient_id: fixture.flour.id,
                version: 2,
            })
            .await
            .unwrap();
        assert_eq!(invalidated, 1);

        let after = service.suggest(fixture.tenant, input).await.unwrap();
        assert_eq!(after.components.ingredient_cost, dec!(24));
    }

    #[tokio::test]
    async fn test_recipe_event_invalidates_single_recipe() {
        let fixture = fixture().await;
        let service = service(&fixture);

        let invalidated = service
            .apply_invalidation(&InvalidationEvent::RecipeItemsChanged {
                tenant_id: fixture.tenant,
                recipe_id: fixture.recipe.id,
                version: 1,
            })
            .await
            .unwrap();
        assert_eq!(invalidated, 1);
    }

    #[tokio::test]
    async fn test_nil_tenant_never_reaches_collaborators() {
        let store = MockSettingsStore::new();
        let catalog = MockCatalog::new();
        let service = PricingService::new(
            store,
            catalog,
            Arc::new(InMemoryResultCache::new()),
            EngineSettings::default(),
        );

        let err = service
            .suggest(
                Uuid::nil(),
                PricingSuggestionInput {
                    product_id: Some(Uuid::now_v7()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PricingError::TenantNotFound(_)));

        let err = service.get_settings(Uuid::nil()).await.unwrap_err();
        assert!(matches!(err, PricingError::TenantNotFound(_)));
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let fixture = fixture().await;
        let cache = Arc::new(InMemoryResultCache::new());
        let service = PricingService::new(
            fixture.store.clone(),
            fixture.catalog.clone(),
            cache.clone(),
            EngineSettings::default(),
        );

        service
            .suggest(
                fixture.tenant,
                PricingSuggestionInput {
                    recipe_id: Some(fixture.recipe.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cache.len(), 1);

        service.clear_cache().await.unwrap();
        assert!(cache.is_empty());
    }
}
