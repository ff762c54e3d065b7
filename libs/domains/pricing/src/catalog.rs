//! Read-only view of the tenant catalog (ingredients, recipes, products).
//!
//! Catalog CRUD lives elsewhere; the engine only reads costs and links.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::PricingResult;
use crate::units::Unit;

/// Ingredient with its current purchase cost per `unit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub unit: Unit,
    pub unit_cost: Decimal,
}

/// One line of a recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeItem {
    pub ingredient_id: Uuid,
    pub quantity: Decimal,
    pub unit: Unit,
    /// Fraction of extra quantity lost in production (0.05 = 5%)
    pub waste_factor: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    /// Units produced per batch
    pub yield_quantity: Decimal,
    pub production_time_minutes: Decimal,
    pub items: Vec<RecipeItem>,
}

/// Sellable product; pricing fields are optional per product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub recipe_id: Option<Uuid>,
    pub packaging_cost: Option<Decimal>,
    pub margin_percent: Option<Decimal>,
    pub sale_price: Option<Decimal>,
}

/// Catalog access needed by the cost aggregator and invalidation fan-out
///
/// Every lookup is scoped to a tenant; rows of other tenants are invisible.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Recipe with its items
    async fn recipe(&self, tenant_id: Uuid, recipe_id: Uuid) -> PricingResult<Option<Recipe>>;

    /// Ingredients by id; unknown ids are omitted from the result
    async fn ingredients(
        &self,
        tenant_id: Uuid,
        ingredient_ids: Vec<Uuid>,
    ) -> PricingResult<Vec<Ingredient>>;

    async fn product(&self, tenant_id: Uuid, product_id: Uuid) -> PricingResult<Option<Product>>;

    /// Ids of the tenant's recipes that reference the ingredient
    async fn recipes_using_ingredient(
        &self,
        tenant_id: Uuid,
        ingredient_id: Uuid,
    ) -> PricingResult<Vec<Uuid>>;
}

/// In-memory catalog for development and testing
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    ingredients: Arc<RwLock<HashMap<Uuid, Ingredient>>>,
    recipes: Arc<RwLock<HashMap<Uuid, Recipe>>>,
    products: Arc<RwLock<HashMap<Uuid, Product>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_ingredient(&self, ingredient: Ingredient) {
        self.ingredients
            .write()
            .await
            .insert(ingredient.id, ingredient);
    }

    pub async fn put_recipe(&self, recipe: Recipe) {
        self.recipes.write().await.insert(recipe.id, recipe);
    }

    pub async fn put_product(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn recipe(&self, tenant_id: Uuid, recipe_id: Uuid) -> PricingResult<Option<Recipe>> {
        let recipes = self.recipes.read().await;
        Ok(recipes
            .get(&recipe_id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned())
    }

    async fn ingredients(
        &self,
        tenant_id: Uuid,
        ingredient_ids: Vec<Uuid>,
    ) -> PricingResult<Vec<Ingredient>> {
        let ingredients = self.ingredients.read().await;
        Ok(ingredient_ids
            .iter()
            .filter_map(|id| ingredients.get(id))
            .filter(|i| i.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn product(&self, tenant_id: Uuid, product_id: Uuid) -> PricingResult<Option<Product>> {
        let products = self.products.read().await;
        Ok(products
            .get(&product_id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn recipes_using_ingredient(
        &self,
        tenant_id: Uuid,
        ingredient_id: Uuid,
    ) -> PricingResult<Vec<Uuid>> {
        let recipes = self.recipes.read().await;
        Ok(recipes
            .values()
            .filter(|r| r.tenant_id == tenant_id)
            .filter(|r| r.items.iter().any(|i| i.ingredient_id == ingredient_id))
            .map(|r| r.id)
            .collect())
    }
}
