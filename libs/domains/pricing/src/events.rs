//! Cost invalidation events.
//!
//! Published by the catalog owner on [`INVALIDATION_CHANNEL`] as JSON, e.g.
//! `{"type":"ingredient_price_changed","tenant_id":"..","ingredient_id":"..","version":17}`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Redis pub/sub channel carrying [`InvalidationEvent`]s
pub const INVALIDATION_CHANNEL: &str = "pricing:invalidations";

/// A catalog change that makes cached recipe costs outdated.
///
/// `version` is monotonic per source (e.g. the row's update sequence).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvalidationEvent {
    IngredientPriceChanged {
        tenant_id: Uuid,
        ingredient_id: Uuid,
        version: u64,
    },
    RecipeItemsChanged {
        tenant_id: Uuid,
        recipe_id: Uuid,
        version: u64,
    },
}

impl InvalidationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            InvalidationEvent::IngredientPriceChanged { .. } => "ingredient_price_changed",
            InvalidationEvent::RecipeItemsChanged { .. } => "recipe_items_changed",
        }
    }

    pub fn tenant_id(&self) -> Uuid {
        match self {
            InvalidationEvent::IngredientPriceChanged { tenant_id, .. }
            | InvalidationEvent::RecipeItemsChanged { tenant_id, .. } => *tenant_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_ingredient_event() {
        let tenant = Uuid::now_v7();
        let ingredient = Uuid::now_v7();
        let payload = format!(
            r#"{{"type":"ingredient_price_changed","tenant_id":"{tenant}","ingredient_id":"{ingredient}","version":17}}"#
        );

        let event: InvalidationEvent = serde_json::from_str(&payload).unwrap();
        assert_eq!(
            event,
            InvalidationEvent::IngredientPriceChanged {
                tenant_id: tenant,
                ingredient_id: ingredient,
                version: 17,
            }
        );
        assert_eq!(event.kind(), "ingredient_price_changed");
        assert_eq!(event.tenant_id(), tenant);
    }

    #[test]
    fn test_rejects_unknown_event_type() {
        let payload = r#"{"type":"product_deleted","tenant_id":"00000000-0000-0000-0000-000000000000"}"#;
        assert!(serde_json::from_str::<InvalidationEvent>(payload).is_err());
    }
}
