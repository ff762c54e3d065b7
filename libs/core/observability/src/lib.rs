//! Observability utilities for the pricing service.
//!
//! This crate provides:
//! - Prometheus metrics recording and export
//! - Engine metrics for the cost cache, settings resolution and suggestions
//!
//! # Example
//!
//! ```rust,ignore
//! use observability::{init_metrics, metrics_handler, PricingMetrics};
//!
//! init_metrics()?;
//! PricingMetrics::record_cache_miss();
//!
//! let app = Router::new()
//!     .route("/metrics", get(metrics_handler));
//! ```

pub mod pricing;

pub use pricing::{PricingMetrics, SuggestionTimer};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the Prometheus metrics recorder.
///
/// Call once at startup; later calls return the installed handle.
pub fn init_metrics() -> Result<&'static PrometheusHandle, BuildError> {
    METRICS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;

        info!("Prometheus metrics recorder initialized");
        register_metric_descriptions();

        Ok(handle)
    })
}

/// Get the metrics handle (must call init_metrics first)
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Axum handler for /metrics endpoint
pub async fn metrics_handler() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

fn register_metric_descriptions() {
    use metrics::describe_counter;
    use metrics::describe_histogram;

    describe_counter!(
        "pricing_cost_cache_total",
        "Cost cache lookups by result (hit, stale_hit, miss)"
    );
    describe_counter!(
        "pricing_cost_cache_discarded_writes_total",
        "Computed cost bases dropped because an invalidation overtook them"
    );
    describe_counter!(
        "pricing_cost_cache_errors_total",
        "Cost cache backend errors by operation"
    );
    describe_counter!(
        "pricing_cost_cache_purged_total",
        "Cost cache entries removed by the retention sweep"
    );
    describe_counter!(
        "pricing_invalidations_total",
        "Invalidation events applied by event type"
    );
    describe_counter!(
        "pricing_invalidated_recipes_total",
        "Recipes invalidated by event type"
    );
    describe_counter!(
        "pricing_settings_fallbacks_total",
        "Suggestions served with last-known settings"
    );
    describe_counter!(
        "pricing_settings_updates_total",
        "Tenant settings updates"
    );
    describe_counter!(
        "pricing_suggestions_total",
        "Price suggestions by outcome"
    );
    describe_histogram!(
        "pricing_suggestion_duration_seconds",
        "Price suggestion latency in seconds"
    );
}
