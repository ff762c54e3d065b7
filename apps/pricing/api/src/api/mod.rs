//! API routes module

pub mod health;

use axum::Router;
use domain_pricing::handlers::router_with_shared;

use crate::state::AppState;

/// Routes mounted under `/api`
pub fn routes(state: &AppState) -> Router {
    Router::new().nest("/pricing", router_with_shared(state.service.clone()))
}
