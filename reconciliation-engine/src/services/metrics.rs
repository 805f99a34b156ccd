//! Prometheus metrics for the reconciliation engine.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Reconciliations started.
pub static RECONCILIATIONS_STARTED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_started_total",
        "Total number of reconciliations started",
        &["status"] // ok, error
    )
    .expect("Failed to register reconciliations_started")
});

/// Completion attempts by outcome.
pub static COMPLETIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_completions_total",
        "Total number of completion attempts",
        &["outcome"] // completed, not_balanced, conflict
    )
    .expect("Failed to register completions_total")
});

/// Item cleared-flag toggles.
pub static ITEM_TOGGLES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_item_toggles_total",
        "Total number of item cleared toggles",
        &["cleared"] // true, false
    )
    .expect("Failed to register item_toggles_total")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "reconciliation_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&RECONCILIATIONS_STARTED);
    Lazy::force(&COMPLETIONS_TOTAL);
    Lazy::force(&ITEM_TOGGLES_TOTAL);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
