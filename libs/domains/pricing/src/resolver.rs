use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use observability::PricingMetrics;

use crate::error::{PricingError, PricingResult};
use crate::models::{
    PricingSettings, ResolvedSettings, SettingsLayer, StoredSettings, UpdatePricingSettings,
};
use crate::store::SettingsStore;

#[derive(Debug, Clone, Copy)]
struct CachedSettings {
    values: SettingsLayer,
    fetched_at: Instant,
}

/// Merges innate defaults, stored tenant settings and request overrides.
///
/// Stored settings go through a short-lived per-tenant cache. When the store
/// is slow or failing, the last-known copy is used regardless of age and the
/// result is marked stale.
pub struct SettingsResolver<S: SettingsStore> {
    store: Arc<S>,
    cache: DashMap<Uuid, CachedSettings>,
    ttl: Duration,
    store_timeout: Duration,
}

impl<S: SettingsStore> SettingsResolver<S> {
    pub fn new(store: Arc<S>, ttl: Duration, store_timeout: Duration) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            ttl,
            store_timeout,
        }
    }

    /// Effective settings for one computation; `overrides` win over everything.
    #[instrument(skip(self, overrides), fields(tenant_id = %tenant_id))]
    pub async fn resolve(
        &self,
        tenant_id: Uuid,
        overrides: &SettingsLayer,
    ) -> PricingResult<ResolvedSettings> {
        ensure_tenant(tenant_id)?;

        let (stored, stale) = self.stored_layer(tenant_id).await?;
        Ok(ResolvedSettings {
            effective: overrides.over(&stored).resolve(),
            stale,
        })
    }

    /// Tenant settings with defaults applied, no overrides
    pub async fn settings(&self, tenant_id: Uuid) -> PricingResult<PricingSettings> {
        let resolved = self.resolve(tenant_id, &SettingsLayer::default()).await?;
        Ok(PricingSettings::from_effective(tenant_id, &resolved.effective))
    }

    /// Merge a partial update into the tenant's stored settings.
    ///
    /// Fields absent from `patch` keep their prior value.
    #[instrument(skip(self, patch), fields(tenant_id = %tenant_id))]
    pub async fn upsert(
        &self,
        tenant_id: Uuid,
        patch: &UpdatePricingSettings,
    ) -> PricingResult<PricingSettings> {
        ensure_tenant(tenant_id)?;
        patch.validate()?;

        let row = timeout(
            self.store_timeout,
            self.store.upsert(tenant_id, patch.as_layer()),
        )
        .await
        .map_err(|_| PricingError::UpstreamUnavailable("settings store timed out".to_string()))??;

        self.remember(&row);
        PricingMetrics::record_settings_updated();

        Ok(PricingSettings::from_effective(
            tenant_id,
            &row.values.resolve(),
        ))
    }

    async fn stored_layer(&self, tenant_id: Uuid) -> PricingResult<(SettingsLayer, bool)> {
        let cached = self.cache.get(&tenant_id).map(|entry| *entry);

        if let Some(cached) = cached {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok((cached.values, false));
            }
        }

        let failure = match timeout(self.store_timeout, self.load(tenant_id)).await {
            Ok(Ok(row)) => {
                self.remember(&row);
                return Ok((row.values, false));
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "settings store timed out".to_string(),
        };

        match cached {
            Some(cached) => {
                warn!(
                    error = %failure,
                    age_ms = cached.fetched_at.elapsed().as_millis() as u64,
                    "Serving last-known pricing settings"
                );
                PricingMetrics::record_settings_fallback();
                Ok((cached.values, true))
            }
            None => Err(PricingError::UpstreamUnavailable(failure)),
        }
    }

    /// Read the row, seeding an empty one on first access
    async fn load(&self, tenant_id: Uuid) -> PricingResult<StoredSettings> {
        match self.store.get(tenant_id).await? {
            Some(row) => Ok(row),
            None => {
                debug!("Seeding pricing settings");
                self.store.seed(tenant_id).await
            }
        }
    }

    fn remember(&self, row: &StoredSettings) {
        self.cache.insert(
            row.tenant_id,
            CachedSettings {
                values: row.values,
                fetched_at: Instant::now(),
            },
        );
    }
}

pub(crate) fn ensure_tenant(tenant_id: Uuid) -> PricingResult<()> {
    if tenant_id.is_nil() {
        return Err(PricingError::TenantNotFound(tenant_id.to_string()));
    }
    Ok(())
}
