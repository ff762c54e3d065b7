//! Application state management.

use std::sync::Arc;

use domain_pricing::{PgCatalog, PgSettingsStore, PricingService};
use redis::aio::ConnectionManager;
use sea_orm::DatabaseConnection;

/// Pricing service wired to the Postgres store and catalog
pub type PricingApi = PricingService<PgSettingsStore, PgCatalog>;

/// Shared application state.
///
/// Cloned per handler; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration loaded from environment variables
    pub config: crate::config::Config,
    /// PostgreSQL connection pool
    pub db: DatabaseConnection,
    /// Redis connection manager, when the shared cost cache is enabled
    pub redis: Option<ConnectionManager>,
    pub service: Arc<PricingApi>,
}
