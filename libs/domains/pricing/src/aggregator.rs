use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use observability::PricingMetrics;

use crate::cache::{CacheKey, CachedCost, PutOutcome, ResultCache};
use crate::calculator::checked;
use crate::catalog::{Catalog, Product};
use crate::error::{PricingError, PricingResult};
use crate::models::{CostBasis, RecipeCostSnapshot};
use crate::units::convert;

/// Per-request inputs re-applied on top of a (possibly cached) cost basis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostInputs {
    pub labor_cost_per_minute: Decimal,
    pub packaging_cost: Decimal,
}

/// Computes the batch cost of a recipe from catalog data.
///
/// Only the override-independent cost basis is cached; labor and packaging
/// are applied per request.
pub struct CostAggregator<C: Catalog> {
    catalog: Arc<C>,
    cache: Arc<dyn ResultCache>,
    ttl: Duration,
    catalog_timeout: Duration,
}

impl<C: Catalog> CostAggregator<C> {
    pub fn new(
        catalog: Arc<C>,
        cache: Arc<dyn ResultCache>,
        ttl: Duration,
        catalog_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            cache,
            ttl,
            catalog_timeout,
        }
    }

    #[instrument(skip(self, inputs), fields(tenant_id = %tenant_id, recipe_id = %recipe_id))]
    pub async fn aggregate_cost(
        &self,
        tenant_id: Uuid,
        recipe_id: Uuid,
        inputs: &CostInputs,
    ) -> PricingResult<RecipeCostSnapshot> {
        let basis = self.cost_basis(tenant_id, recipe_id).await?;

        let labor_cost = checked(
            basis
                .production_time_minutes
                .checked_mul(inputs.labor_cost_per_minute),
            "labor_cost_per_minute",
        )?;

        Ok(RecipeCostSnapshot {
            ingredient_cost: basis.ingredient_cost,
            labor_cost,
            packaging_cost: inputs.packaging_cost,
            yield_quantity: basis.yield_quantity,
            production_time_minutes: basis.production_time_minutes,
        })
    }

    /// Product lookup, bounded by the catalog timeout
    pub async fn product(&self, tenant_id: Uuid, product_id: Uuid) -> PricingResult<Product> {
        self.bounded(self.catalog.product(tenant_id, product_id))
            .await?
            .ok_or_else(|| PricingError::product_not_found(product_id))
    }

    /// Invalidate one recipe. Returns the new watermark.
    pub async fn invalidate_recipe(
        &self,
        tenant_id: Uuid,
        recipe_id: Uuid,
        version: u64,
    ) -> PricingResult<u64> {
        let watermark = self
            .cache
            .invalidate(&CacheKey::new(tenant_id, recipe_id), version)
            .await?;
        debug!(
            tenant_id = %tenant_id,
            recipe_id = %recipe_id,
            watermark,
            "Invalidated recipe cost"
        );
        Ok(watermark)
    }

    /// Invalidate every recipe of the tenant that uses the ingredient.
    /// Returns how many recipes were invalidated.
    pub async fn invalidate_ingredient(
        &self,
        tenant_id: Uuid,
        ingredient_id: Uuid,
        version: u64,
    ) -> PricingResult<usize> {
        let recipes = self
            .bounded(self.catalog.recipes_using_ingredient(tenant_id, ingredient_id))
            .await?;

        for recipe_id in &recipes {
            self.invalidate_recipe(tenant_id, *recipe_id, version).await?;
        }
        Ok(recipes.len())
    }

    async fn cost_basis(&self, tenant_id: Uuid, recipe_id: Uuid) -> PricingResult<CostBasis> {
        let key = CacheKey::new(tenant_id, recipe_id);

        let cached = self.cache.get(&key).await.unwrap_or_else(|e| {
            warn!(error = %e, "Cost cache read failed");
            PricingMetrics::record_cache_error("get");
            None
        });

        if let Some(entry) = cached.filter(|c| c.is_fresh(self.ttl, Utc::now())) {
            PricingMetrics::record_cache_hit(false);
            return Ok(entry.basis);
        }
        PricingMetrics::record_cache_miss();

        // Read before computing so a concurrent invalidation makes our write a no-op.
        let version = match self.cache.version(&key).await {
            Ok(version) => Some(version),
            Err(e) => {
                warn!(error = %e, "Cost cache version read failed");
                PricingMetrics::record_cache_error("version");
                None
            }
        };

        let basis = match timeout(self.catalog_timeout, self.compute_basis(tenant_id, recipe_id))
            .await
        {
            Ok(result) => result?,
            Err(_) => return self.serve_stale(cached),
        };

        if let Some(version) = version {
            match self.cache.put(&key, version, basis).await {
                Ok(PutOutcome::Stored) => {}
                Ok(PutOutcome::Discarded) => {
                    debug!(version, "Cost basis outdated by invalidation, not cached");
                    PricingMetrics::record_cache_write_discarded();
                }
                Err(e) => {
                    warn!(error = %e, "Cost cache write failed");
                    PricingMetrics::record_cache_error("put");
                }
            }
        }

        Ok(basis)
    }

    fn serve_stale(&self, cached: Option<CachedCost>) -> PricingResult<CostBasis> {
        match cached {
            Some(entry) => {
                warn!(
                    computed_at = %entry.computed_at,
                    "Catalog timed out, serving expired cost basis"
                );
                PricingMetrics::record_cache_hit(true);
                Ok(entry.basis)
            }
            None => Err(PricingError::UpstreamUnavailable(
                "catalog timed out".to_string(),
            )),
        }
    }

    async fn compute_basis(&self, tenant_id: Uuid, recipe_id: Uuid) -> PricingResult<CostBasis> {
        let recipe = self
            .catalog
            .recipe(tenant_id, recipe_id)
            .await?
            .ok_or_else(|| PricingError::recipe_not_found(recipe_id))?;

        let ids: Vec<Uuid> = recipe
            .items
            .iter()
            .map(|item| item.ingredient_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let ingredients: HashMap<Uuid, _> = self
            .catalog
            .ingredients(tenant_id, ids)
            .await?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();

        let mut ingredient_cost = Decimal::ZERO;
        for item in &recipe.items {
            let ingredient = ingredients
                .get(&item.ingredient_id)
                .ok_or_else(|| PricingError::ingredient_not_found(item.ingredient_id))?;

            let quantity = convert(item.quantity, item.unit, ingredient.unit, ingredient.id)?;
            let item_cost = ingredient
                .unit_cost
                .checked_mul(quantity)
                .and_then(|cost| cost.checked_mul(Decimal::ONE + item.waste_factor));
            ingredient_cost = checked(
                item_cost.and_then(|cost| ingredient_cost.checked_add(cost)),
                "ingredient_cost",
            )?;
        }

        Ok(CostBasis {
            ingredient_cost,
            yield_quantity: recipe.yield_quantity,
            production_time_minutes: recipe.production_time_minutes,
        })
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = PricingResult<T>>,
    ) -> PricingResult<T> {
        timeout(self.catalog_timeout, call)
            .await
            .map_err(|_| PricingError::UpstreamUnavailable("catalog timed out".to_string()))?
    }
}
