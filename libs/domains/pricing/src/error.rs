use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::units::Unit;

/// Result type for pricing operations
pub type PricingResult<T> = Result<T, PricingError>;

/// Errors that can occur in the pricing domain
#[derive(Debug, Error)]
pub enum PricingError {
    /// Invalid input; `field` names the offending request field
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// The tenant identifier is missing, malformed or nil
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    /// Unknown recipe, product or ingredient
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// A recipe item is measured in a unit that cannot be converted to the
    /// ingredient's stored unit
    #[error("Incompatible units for ingredient {ingredient_id}: cannot convert {from} to {to}")]
    IncompatibleUnits {
        ingredient_id: Uuid,
        from: Unit,
        to: Unit,
    },

    /// Settings store or catalog did not answer in time and no fallback exists
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Cache backend error
    #[error("Cache error: {0}")]
    Cache(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PricingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        PricingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn recipe_not_found(id: Uuid) -> Self {
        PricingError::NotFound {
            entity: "Recipe",
            id,
        }
    }

    pub fn product_not_found(id: Uuid) -> Self {
        PricingError::NotFound {
            entity: "Product",
            id,
        }
    }

    pub fn ingredient_not_found(id: Uuid) -> Self {
        PricingError::NotFound {
            entity: "Ingredient",
            id,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PricingError::Validation { .. } => StatusCode::BAD_REQUEST,
            PricingError::TenantNotFound(_) | PricingError::NotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            PricingError::IncompatibleUnits { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PricingError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PricingError::Database(_) | PricingError::Cache(_) | PricingError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for PricingError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            PricingError::Database(e) => {
                tracing::error!(error = %e, "Database error while pricing");
                "Database error".to_string()
            }
            PricingError::Cache(e) => {
                tracing::error!(error = %e, "Cache error while pricing");
                "Cache error".to_string()
            }
            PricingError::Internal(e) => {
                tracing::error!(error = %e, "Internal pricing error");
                "Internal error".to_string()
            }
            _ => self.to_string(),
        };

        let mut body = json!({
            "error": message,
            "code": status.as_u16()
        });

        match &self {
            PricingError::Validation { field, .. } => {
                body["field"] = json!(field);
            }
            PricingError::IncompatibleUnits { from, to, .. } => {
                body["from_unit"] = json!(from.to_string());
                body["to_unit"] = json!(to.to_string());
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

impl From<redis::RedisError> for PricingError {
    fn from(err: redis::RedisError) -> Self {
        PricingError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for PricingError {
    fn from(err: serde_json::Error) -> Self {
        PricingError::Internal(err.to_string())
    }
}
