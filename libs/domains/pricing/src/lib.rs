//! Pricing Domain
//!
//! Resolves per-tenant pricing settings and suggests retail prices for
//! recipes and products.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   Handlers   │  ← /settings, /suggest
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │   Service    │  ← Orchestration, invalidation events
//! └──┬────┬────┬─┘
//!    │    │    │
//!    │    │  ┌─▼──────────┐
//!    │    │  │ Calculator │  ← Pure price arithmetic
//!    │    │  └────────────┘
//!    │  ┌─▼──────────┐   ┌─────────────┐
//!    │  │ Aggregator │──▶│ ResultCache │  ← Versioned cost bases
//!    │  └─────┬──────┘   └─────────────┘
//!    │        │
//!    │  ┌─────▼──────┐
//!    │  │  Catalog   │  ← Ingredients, recipes, products
//!    │  └────────────┘
//! ┌──▼────────┐   ┌───────────────┐
//! │ Resolver  │──▶│ SettingsStore │  ← Defaults → stored → overrides
//! └───────────┘   └───────────────┘
//! ```

pub mod aggregator;
pub mod cache;
pub mod calculator;
pub mod catalog;
pub mod entity;
pub mod error;
pub mod events;
pub mod handlers;
pub mod models;
pub mod postgres;
pub mod resolver;
pub mod service;
pub mod store;
pub mod units;

// Re-export commonly used types
pub use cache::{CacheKey, InMemoryResultCache, RedisResultCache, ResultCache};
pub use catalog::{Catalog, InMemoryCatalog, Ingredient, Product, Recipe, RecipeItem};
pub use error::{PricingError, PricingResult};
pub use events::{INVALIDATION_CHANNEL, InvalidationEvent};
pub use models::{
    EffectiveSettings, PricingSettings, PricingSuggestion, PricingSuggestionInput,
    SuggestionFlags, UpdatePricingSettings,
};
pub use postgres::{PgCatalog, PgSettingsStore};
pub use service::{EngineSettings, PricingService};
pub use store::{InMemorySettingsStore, SettingsStore};
pub use units::Unit;
