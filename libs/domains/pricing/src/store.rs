use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::PricingResult;
use crate::models::{SettingsLayer, StoredSettings};

/// Durable per-tenant pricing settings
///
/// Rows keep unset fields as `None`; defaults are applied by the resolver,
/// never written back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Get the stored settings row for a tenant, if one exists
    async fn get(&self, tenant_id: Uuid) -> PricingResult<Option<StoredSettings>>;

    /// Ensure a row exists for the tenant (all fields unset). Idempotent.
    async fn seed(&self, tenant_id: Uuid) -> PricingResult<StoredSettings>;

    /// Merge the set fields of `patch` into the tenant's row, creating it if needed
    async fn upsert(&self, tenant_id: Uuid, patch: SettingsLayer) -> PricingResult<StoredSettings>;
}

/// In-memory implementation of SettingsStore for development and testing
#[derive(Clone, Default)]
pub struct InMemorySettingsStore {
    rows: Arc<RwLock<HashMap<Uuid, StoredSettings>>>,
}

impl InMemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn get(&self, tenant_id: Uuid) -> PricingResult<Option<StoredSettings>> {
        let rows = self.rows.read().await;
        Ok(rows.get(&tenant_id).cloned())
    }

    async fn seed(&self, tenant_id: Uuid) -> PricingResult<StoredSettings> {
        let mut rows = self.rows.write().await;
        let row = rows
            .entry(tenant_id)
            .or_insert_with(|| StoredSettings::seeded(tenant_id));
        Ok(row.clone())
    }

    async fn upsert(&self, tenant_id: Uuid, patch: SettingsLayer) -> PricingResult<StoredSettings> {
        let mut rows = self.rows.write().await;
        let row = rows
            .entry(tenant_id)
            .or_insert_with(|| StoredSettings::seeded(tenant_id));

        row.values = patch.over(&row.values);
        row.updated_at = Utc::now();

        tracing::debug!(tenant_id = %tenant_id, "Updated pricing settings");
        Ok(row.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_seed_creates_unset_row() {
        let store = InMemorySettingsStore::new();
        let tenant = Uuid::now_v7();

        assert!(store.get(tenant).await.unwrap().is_none());

        let row = store.seed(tenant).await.unwrap();
        assert_eq!(row.values, SettingsLayer::default());
        assert!(store.get(tenant).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_seed_does_not_overwrite() {
        let store = InMemorySettingsStore::new();
        let tenant = Uuid::now_v7();

        store
            .upsert(
                tenant,
                SettingsLayer {
                    tax_rate: Some(dec!(8)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let row = store.seed(tenant).await.unwrap();
        assert_eq!(row.values.tax_rate, Some(dec!(8)));
    }

    #[tokio::test]
    async fn test_upsert_merges_only_set_fields() {
        let store = InMemorySettingsStore::new();
        let tenant = Uuid::now_v7();

        store
            .upsert(
                tenant,
                SettingsLayer {
                    margin_percent: Some(dec!(40)),
                    packaging_cost: Some(dec!(0)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let row = store
            .upsert(
                tenant,
                SettingsLayer {
                    margin_percent: Some(dec!(45)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(row.values.margin_percent, Some(dec!(45)));
        assert_eq!(row.values.packaging_cost, Some(dec!(0)));
        assert_eq!(row.values.labor_cost_per_minute, None);
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let store = InMemorySettingsStore::new();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();

        store
            .upsert(
                a,
                SettingsLayer {
                    sales_volume: Some(dec!(500)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(store.get(b).await.unwrap().is_none());
    }
}
