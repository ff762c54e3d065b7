//! HTTP handlers for pricing domain

use axum::{
    Json, Router,
    extract::{FromRequest, FromRequestParts, Request, State, rejection::JsonRejection},
    http::request::Parts,
    routing::{get, post},
};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::error::{PricingError, PricingResult};
use crate::models::{
    CostComponents, EffectiveSettings, PricingSettings, PricingSuggestion, PricingSuggestionInput,
    SuggestionFlags, SuggestionInputs, UpdatePricingSettings,
};
use crate::service::PricingService;
use crate::store::SettingsStore;

/// Header carrying the caller's tenant
pub const TENANT_HEADER: &str = "x-tenant-id";

const TAG: &str = "pricing";

/// OpenAPI documentation for Pricing API
#[derive(OpenApi)]
#[openapi(
    paths(get_settings, update_settings, suggest_price),
    components(schemas(
        PricingSettings,
        UpdatePricingSettings,
        PricingSuggestionInput,
        PricingSuggestion,
        CostComponents,
        SuggestionFlags,
        SuggestionInputs,
        EffectiveSettings,
        ErrorBody,
    )),
    tags((name = TAG, description = "Pricing settings and price suggestions"))
)]
pub struct ApiDoc;

/// Error payload returned by every pricing endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub code: u16,
    /// Offending field, for validation errors
    pub field: Option<String>,
}

/// Tenant resolved from the `X-Tenant-ID` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantId(pub Uuid);

impl<S: Send + Sync> FromRequestParts<S> for TenantId {
    type Rejection = PricingError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(TENANT_HEADER)
            .ok_or_else(|| PricingError::validation("X-Tenant-ID", "header is required"))?;

        let raw = raw
            .to_str()
            .map_err(|_| PricingError::TenantNotFound("<non-ascii>".to_string()))?;

        match Uuid::parse_str(raw.trim()) {
            Ok(id) if !id.is_nil() => Ok(TenantId(id)),
            _ => Err(PricingError::TenantNotFound(raw.to_string())),
        }
    }
}

/// JSON body extractor whose rejections use the pricing error shape
pub struct PricingJson<T>(pub T);

impl<T, S> FromRequest<S> for PricingJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = PricingError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| {
                PricingError::validation("body", rejection.body_text())
            })?;
        Ok(PricingJson(value))
    }
}

/// Create the pricing router with all HTTP endpoints
pub fn router<S, C>(service: PricingService<S, C>) -> Router
where
    S: SettingsStore + 'static,
    C: Catalog + 'static,
{
    router_with_shared(Arc::new(service))
}

/// Same as [`router`] for a service that is also used outside HTTP
pub fn router_with_shared<S, C>(service: Arc<PricingService<S, C>>) -> Router
where
    S: SettingsStore + 'static,
    C: Catalog + 'static,
{
    Router::new()
        .route("/settings", get(get_settings).put(update_settings))
        .route("/suggest", post(suggest_price))
        .with_state(service)
}

/// Get the tenant's pricing settings
#[utoipa::path(
    get,
    path = "/settings",
    tag = TAG,
    params(("X-Tenant-ID" = Uuid, Header, description = "Tenant identifier")),
    responses(
        (status = 200, description = "Resolved settings with defaults applied", body = PricingSettings),
        (status = 400, description = "Missing tenant header", body = ErrorBody),
        (status = 404, description = "Invalid tenant", body = ErrorBody),
        (status = 503, description = "Settings store unavailable", body = ErrorBody)
    )
)]
async fn get_settings<S: SettingsStore, C: Catalog>(
    State(service): State<Arc<PricingService<S, C>>>,
    TenantId(tenant_id): TenantId,
) -> PricingResult<Json<PricingSettings>> {
    let settings = service.get_settings(tenant_id).await?;
    Ok(Json(settings))
}

/// Partially update the tenant's pricing settings
#[utoipa::path(
    put,
    path = "/settings",
    tag = TAG,
    params(("X-Tenant-ID" = Uuid, Header, description = "Tenant identifier")),
    request_body = UpdatePricingSettings,
    responses(
        (status = 200, description = "Merged settings", body = PricingSettings),
        (status = 400, description = "Negative value or unknown field", body = ErrorBody),
        (status = 404, description = "Invalid tenant", body = ErrorBody),
        (status = 503, description = "Settings store unavailable", body = ErrorBody)
    )
)]
async fn update_settings<S: SettingsStore, C: Catalog>(
    State(service): State<Arc<PricingService<S, C>>>,
    TenantId(tenant_id): TenantId,
    PricingJson(patch): PricingJson<UpdatePricingSettings>,
) -> PricingResult<Json<PricingSettings>> {
    let settings = service.update_settings(tenant_id, patch).await?;
    Ok(Json(settings))
}

/// Suggest a retail price for a recipe or product
#[utoipa::path(
    post,
    path = "/suggest",
    tag = TAG,
    params(("X-Tenant-ID" = Uuid, Header, description = "Tenant identifier")),
    request_body = PricingSuggestionInput,
    responses(
        (status = 200, description = "Price suggestion", body = PricingSuggestion),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 404, description = "Unknown tenant, recipe, product or ingredient", body = ErrorBody),
        (status = 422, description = "Incompatible units in recipe", body = ErrorBody),
        (status = 503, description = "Upstream unavailable", body = ErrorBody)
    )
)]
async fn suggest_price<S: SettingsStore, C: Catalog>(
    State(service): State<Arc<PricingService<S, C>>>,
    TenantId(tenant_id): TenantId,
    PricingJson(input): PricingJson<PricingSuggestionInput>,
) -> PricingResult<Json<PricingSuggestion>> {
    let suggestion = service.suggest(tenant_id, input).await?;
    Ok(Json(suggestion))
}
