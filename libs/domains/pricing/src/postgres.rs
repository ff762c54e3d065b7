use async_trait::async_trait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::catalog::{Catalog, Ingredient, Product, Recipe};
use crate::entity::{ingredient, pricing_settings, product, recipe, recipe_item};
use crate::error::{PricingError, PricingResult};
use crate::models::{SettingsLayer, StoredSettings};
use crate::store::SettingsStore;

fn empty_settings_row(tenant_id: Uuid) -> pricing_settings::ActiveModel {
    let now = chrono::Utc::now();
    pricing_settings::ActiveModel {
        tenant_id: Set(tenant_id),
        labor_cost_per_minute: Set(None),
        default_packaging_cost: Set(None),
        default_margin_percent: Set(None),
        fixed_monthly_costs: Set(None),
        variable_cost_percent: Set(None),
        default_tax_rate: Set(None),
        default_sales_volume: Set(None),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
}

/// PostgreSQL implementation of SettingsStore
#[derive(Clone)]
pub struct PgSettingsStore {
    db: DatabaseConnection,
}

impl PgSettingsStore {
    /// Create a new PostgreSQL settings store
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn insert_if_missing<C: sea_orm::ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
    ) -> PricingResult<()> {
        pricing_settings::Entity::insert(empty_settings_row(tenant_id))
            .on_conflict(
                OnConflict::column(pricing_settings::Column::TenantId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn get(&self, tenant_id: Uuid) -> PricingResult<Option<StoredSettings>> {
        let result = pricing_settings::Entity::find_by_id(tenant_id)
            .one(&self.db)
            .await?
            .map(Into::into);
        Ok(result)
    }

    async fn seed(&self, tenant_id: Uuid) -> PricingResult<StoredSettings> {
        Self::insert_if_missing(&self.db, tenant_id).await?;

        pricing_settings::Entity::find_by_id(tenant_id)
            .one(&self.db)
            .await?
            .map(Into::into)
            .ok_or_else(|| PricingError::Internal("seeded settings row vanished".to_string()))
    }

    async fn upsert(&self, tenant_id: Uuid, patch: SettingsLayer) -> PricingResult<StoredSettings> {
        let txn = self.db.begin().await?;

        Self::insert_if_missing(&txn, tenant_id).await?;

        // Row lock serializes concurrent partial updates of the same tenant.
        let existing = pricing_settings::Entity::find_by_id(tenant_id)
            .lock_exclusive()
            .one(&txn)
            .await?
            .ok_or_else(|| PricingError::Internal("settings row missing after seed".to_string()))?;

        let mut model = existing.into_active_model();

        if let Some(value) = patch.labor_cost_per_minute {
            model.labor_cost_per_minute = Set(Some(value));
        }
        if let Some(value) = patch.packaging_cost {
            model.default_packaging_cost = Set(Some(value));
        }
        if let Some(value) = patch.margin_percent {
            model.default_margin_percent = Set(Some(value));
        }
        if let Some(value) = patch.fixed_monthly_costs {
            model.fixed_monthly_costs = Set(Some(value));
        }
        if let Some(value) = patch.variable_cost_percent {
            model.variable_cost_percent = Set(Some(value));
        }
        if let Some(value) = patch.tax_rate {
            model.default_tax_rate = Set(Some(value));
        }
        if let Some(value) = patch.sales_volume {
            model.default_sales_volume = Set(Some(value));
        }

        model.updated_at = Set(chrono::Utc::now().into());

        let updated = model.update(&txn).await?;
        txn.commit().await?;

        Ok(updated.into())
    }
}

/// PostgreSQL implementation of Catalog over the catalog tables
#[derive(Clone)]
pub struct PgCatalog {
    db: DatabaseConnection,
}

impl PgCatalog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn recipe(&self, tenant_id: Uuid, recipe_id: Uuid) -> PricingResult<Option<Recipe>> {
        let Some(model) = recipe::Entity::find_by_id(recipe_id)
            .filter(recipe::Column::TenantId.eq(tenant_id))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let items = recipe_item::Entity::find()
            .filter(recipe_item::Column::TenantId.eq(tenant_id))
            .filter(recipe_item::Column::RecipeId.eq(recipe_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        Ok(Some(Recipe {
            id: model.id,
            tenant_id: model.tenant_id,
            name: model.name,
            yield_quantity: model.yield_quantity,
            production_time_minutes: model.production_time_minutes,
            items,
        }))
    }

    async fn ingredients(
        &self,
        tenant_id: Uuid,
        ingredient_ids: Vec<Uuid>,
    ) -> PricingResult<Vec<Ingredient>> {
        if ingredient_ids.is_empty() {
            return Ok(Vec::new());
        }

        let results = ingredient::Entity::find()
            .filter(ingredient::Column::TenantId.eq(tenant_id))
            .filter(ingredient::Column::Id.is_in(ingredient_ids))
            .all(&self.db)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        Ok(results)
    }

    async fn product(&self, tenant_id: Uuid, product_id: Uuid) -> PricingResult<Option<Product>> {
        let result = product::Entity::find_by_id(product_id)
            .filter(product::Column::TenantId.eq(tenant_id))
            .one(&self.db)
            .await?
            .map(Into::into);
        Ok(result)
    }

    async fn recipes_using_ingredient(
        &self,
        tenant_id: Uuid,
        ingredient_id: Uuid,
    ) -> PricingResult<Vec<Uuid>> {
        let results = recipe_item::Entity::find()
            .filter(recipe_item::Column::TenantId.eq(tenant_id))
            .filter(recipe_item::Column::IngredientId.eq(ingredient_id))
            .select_only()
            .column(recipe_item::Column::RecipeId)
            .distinct()
            .into_tuple::<Uuid>()
            .all(&self.db)
            .await?;
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::Unit;
    use rust_decimal_macros::dec;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Transaction, Value};
    use std::collections::BTreeMap;

    fn statements(log: &[Transaction]) -> Vec<String> {
        log.iter()
            .flat_map(|txn| txn.statements())
            .map(|stmt| stmt.sql.clone())
            .collect()
    }

    fn find<'a>(sql: &'a [String], prefix: &str) -> &'a str {
        sql.iter()
            .find(|stmt| stmt.starts_with(prefix))
            .unwrap_or_else(|| panic!("no {prefix} statement in {sql:?}"))
    }

    fn settings_row(tenant_id: Uuid) -> pricing_settings::Model {
        let now = chrono::Utc::now();
        pricing_settings::Model {
            tenant_id,
            labor_cost_per_minute: None,
            default_packaging_cost: None,
            default_margin_percent: Some(dec!(0)),
            fixed_monthly_costs: Some(dec!(2500)),
            variable_cost_percent: None,
            default_tax_rate: None,
            default_sales_volume: None,
            created_at: now.into(),
            updated_at: now.into(),
        }
    }

    #[tokio::test]
    async fn test_get_maps_null_columns_to_unset() {
        let tenant = Uuid::now_v7();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![settings_row(tenant)]])
            .into_connection();

        let store = PgSettingsStore::new(db);
        let row = store.get(tenant).await.unwrap().unwrap();

        assert_eq!(row.values.margin_percent, Some(dec!(0)));
        assert_eq!(row.values.fixed_monthly_costs, Some(dec!(2500)));
        assert_eq!(row.values.labor_cost_per_minute, None);
    }

    #[tokio::test]
    async fn test_catalog_product_lookup() {
        let tenant = Uuid::now_v7();
        let model = product::Model {
            id: Uuid::now_v7(),
            tenant_id: tenant,
            name: "brioche".to_string(),
            recipe_id: Some(Uuid::now_v7()),
            packaging_cost: Some(dec!(0.5)),
            margin_percent: None,
            sale_price: Some(dec!(7.90)),
            updated_at: chrono::Utc::now().into(),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![model.clone()]])
            .into_connection();

        let catalog = PgCatalog::new(db);
        let found = catalog.product(tenant, model.id).await.unwrap().unwrap();

        assert_eq!(found.sale_price, Some(dec!(7.90)));
        assert_eq!(found.margin_percent, None);
    }

    #[tokio::test]
    async fn test_upsert_writes_only_patched_columns() {
        let tenant = Uuid::now_v7();
        let existing = settings_row(tenant);
        let updated = pricing_settings::Model {
            default_tax_rate: Some(dec!(8)),
            ..existing.clone()
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .append_query_results([vec![existing], vec![updated]])
            .into_connection();

        let store = PgSettingsStore::new(db.clone());
        let patch = SettingsLayer {
            tax_rate: Some(dec!(8)),
            ..Default::default()
        };
        let row = store.upsert(tenant, patch).await.unwrap();

        assert_eq!(row.values.tax_rate, Some(dec!(8)));
        assert_eq!(row.values.fixed_monthly_costs, Some(dec!(2500)));
        assert_eq!(row.values.margin_percent, Some(dec!(0)));

        let sql = statements(&db.into_transaction_log());
        let insert = find(&sql, "INSERT");
        assert!(insert.contains("ON CONFLICT"));
        assert!(insert.contains("DO NOTHING"));
        assert!(find(&sql, "SELECT").contains("FOR UPDATE"));

        let update = find(&sql, "UPDATE");
        let set_clause = update.split(" WHERE ").next().unwrap_or_default();
        assert!(set_clause.contains(r#""default_tax_rate""#));
        assert!(set_clause.contains(r#""updated_at""#));
        assert!(!set_clause.contains(r#""fixed_monthly_costs""#));
        assert!(!set_clause.contains(r#""default_margin_percent""#));
        assert!(!set_clause.contains(r#""labor_cost_per_minute""#));
    }

    #[tokio::test]
    async fn test_catalog_recipe_maps_items() {
        let tenant = Uuid::now_v7();
        let recipe_id = Uuid::now_v7();
        let flour = Uuid::now_v7();
        let model = recipe::Model {
            id: recipe_id,
            tenant_id: tenant,
            name: "sourdough".to_string(),
            yield_quantity: dec!(2),
            production_time_minutes: dec!(45),
            updated_at: chrono::Utc::now().into(),
        };
        let item = recipe_item::Model {
            id: Uuid::now_v7(),
            tenant_id: tenant,
            recipe_id,
            ingredient_id: flour,
            quantity: dec!(750),
            unit: Unit::Gram,
            waste_factor: dec!(0.05),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![model]])
            .append_query_results([vec![item]])
            .into_connection();

        let catalog = PgCatalog::new(db.clone());
        let found = catalog.recipe(tenant, recipe_id).await.unwrap().unwrap();

        assert_eq!(found.name, "sourdough");
        assert_eq!(found.yield_quantity, dec!(2));
        assert_eq!(found.items.len(), 1);
        assert_eq!(found.items[0].ingredient_id, flour);
        assert_eq!(found.items[0].unit, Unit::Gram);
        assert_eq!(found.items[0].waste_factor, dec!(0.05));

        let sql = statements(&db.into_transaction_log());
        assert_eq!(sql.len(), 2);
        assert!(sql.iter().all(|stmt| stmt.contains(r#""tenant_id" = $"#)));
    }

    #[tokio::test]
    async fn test_catalog_unknown_recipe_skips_item_query() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<recipe::Model>::new()])
            .into_connection();

        let catalog = PgCatalog::new(db.clone());
        let found = catalog.recipe(Uuid::now_v7(), Uuid::now_v7()).await.unwrap();

        assert!(found.is_none());
        assert_eq!(statements(&db.into_transaction_log()).len(), 1);
    }

    #[tokio::test]
    async fn test_catalog_ingredients_are_tenant_filtered() {
        let tenant = Uuid::now_v7();
        let model = ingredient::Model {
            id: Uuid::now_v7(),
            tenant_id: tenant,
            name: "butter".to_string(),
            unit: Unit::Kilogram,
            unit_cost: dec!(11.40),
            updated_at: chrono::Utc::now().into(),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![model.clone()]])
            .into_connection();

        let catalog = PgCatalog::new(db.clone());
        let found = catalog.ingredients(tenant, vec![model.id]).await.unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].unit, Unit::Kilogram);
        assert_eq!(found[0].unit_cost, dec!(11.40));

        let sql = statements(&db.into_transaction_log());
        assert!(sql[0].contains(r#""tenant_id" = $"#));
        assert!(sql[0].contains(" IN ("));
    }

    #[tokio::test]
    async fn test_catalog_ingredients_without_ids_skip_the_query() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let catalog = PgCatalog::new(db.clone());
        let found = catalog.ingredients(Uuid::now_v7(), Vec::new()).await.unwrap();

        assert!(found.is_empty());
        assert!(db.into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn test_catalog_recipes_using_ingredient() {
        let tenant = Uuid::now_v7();
        let bread = Uuid::now_v7();
        let brioche = Uuid::now_v7();
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                BTreeMap::from([("recipe_id", Value::from(bread))]),
                BTreeMap::from([("recipe_id", Value::from(brioche))]),
            ]])
            .into_connection();

        let catalog = PgCatalog::new(db.clone());
        let recipes = catalog
            .recipes_using_ingredient(tenant, Uuid::now_v7())
            .await
            .unwrap();

        assert_eq!(recipes, vec![bread, brioche]);

        let sql = statements(&db.into_transaction_log());
        assert!(sql[0].starts_with("SELECT DISTINCT"));
        assert!(sql[0].contains(r#""tenant_id" = $"#));
        assert!(sql[0].contains(r#""ingredient_id" = $"#));
    }
}
