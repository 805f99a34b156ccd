//! Prometheus metrics for the allocation engine.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Allocation counter (no high-cardinality labels).
pub static ALLOCATIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "allocation_allocations_total",
        "Total number of allocations applied",
        &["status"] // ok, error
    )
    .expect("Failed to register allocations_total")
});

/// Document counter by kind.
pub static DOCUMENTS_CREATED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "allocation_documents_created_total",
        "Total number of allocatable documents created",
        &["kind"]
    )
    .expect("Failed to register documents_created")
});

/// Source counter by kind.
pub static SOURCES_CREATED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "allocation_sources_created_total",
        "Total number of allocation sources created",
        &["kind"]
    )
    .expect("Failed to register sources_created")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "allocation_errors_total",
        "Total number of errors by type",
        &["error_type"]
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "allocation_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&ALLOCATIONS_TOTAL);
    Lazy::force(&DOCUMENTS_CREATED);
    Lazy::force(&SOURCES_CREATED);
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
