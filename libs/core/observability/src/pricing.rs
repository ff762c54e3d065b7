//! Metrics for the pricing suggestion engine.

use metrics::{counter, histogram};
use std::time::Instant;

/// Pricing metrics recorder
pub struct PricingMetrics;

impl PricingMetrics {
    // =========================================================================
    // Cost cache
    // =========================================================================

    /// Cost basis served from the result cache. `stale` marks an entry past
    /// its TTL served because the catalog was unavailable.
    pub fn record_cache_hit(stale: bool) {
        counter!("pricing_cost_cache_total", "result" => if stale { "stale_hit" } else { "hit" })
            .increment(1);
    }

    pub fn record_cache_miss() {
        counter!("pricing_cost_cache_total", "result" => "miss").increment(1);
    }

    /// A computed basis was not stored because an invalidation overtook it
    pub fn record_cache_write_discarded() {
        counter!("pricing_cost_cache_discarded_writes_total").increment(1);
    }

    /// Cache backend failed; the request continued as a miss
    pub fn record_cache_error(operation: &'static str) {
        counter!("pricing_cost_cache_errors_total", "operation" => operation).increment(1);
        tracing::debug!(operation, "Cost cache error treated as miss");
    }

    pub fn record_invalidation(event: &'static str, recipes: usize) {
        counter!("pricing_invalidations_total", "event" => event).increment(1);
        counter!("pricing_invalidated_recipes_total", "event" => event).increment(recipes as u64);
    }

    pub fn record_cache_purged(entries: usize) {
        counter!("pricing_cost_cache_purged_total").increment(entries as u64);
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Last-known settings were served because the store was unavailable
    pub fn record_settings_fallback() {
        counter!("pricing_settings_fallbacks_total").increment(1);
    }

    pub fn record_settings_updated() {
        counter!("pricing_settings_updates_total").increment(1);
    }

    // =========================================================================
    // Suggestions
    // =========================================================================

    pub fn record_suggestion(outcome: &'static str, duration_secs: f64) {
        counter!("pricing_suggestions_total", "outcome" => outcome).increment(1);
        histogram!("pricing_suggestion_duration_seconds", "outcome" => outcome)
            .record(duration_secs);
    }
}

/// Timer guard for suggestion latency.
///
/// Records as `error` when dropped without `success()`.
pub struct SuggestionTimer {
    start: Instant,
    finished: bool,
}

impl SuggestionTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            finished: false,
        }
    }

    /// Record a successful suggestion. Returns the duration in milliseconds.
    pub fn success(mut self) -> u64 {
        self.finish("ok")
    }

    fn finish(&mut self, outcome: &'static str) -> u64 {
        if self.finished {
            return 0;
        }
        self.finished = true;

        let duration = self.start.elapsed();
        PricingMetrics::record_suggestion(outcome, duration.as_secs_f64());
        duration.as_millis() as u64
    }
}

impl Drop for SuggestionTimer {
    fn drop(&mut self) {
        if !self.finished {
            self.finish("error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_records_once() {
        let timer = SuggestionTimer::start();
        let _ = timer.success();
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        PricingMetrics::record_cache_hit(false);
        PricingMetrics::record_cache_miss();
        PricingMetrics::record_invalidation("recipe_items_changed", 1);
        drop(SuggestionTimer::start());
    }
}
