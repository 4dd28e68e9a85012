use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry, Encoder,
    IntCounter, IntCounterVec, Registry, TextEncoder,
};

use crate::watcher::WatchOutcome;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref WATCHES_STARTED_TOTAL: IntCounter = register_int_counter_with_registry!(
        "infratest_job_watches_started_total",
        "Total number of job watches started.",
        REGISTRY
    )
    .expect("Failed to register WATCHES_STARTED_TOTAL");
    pub static ref WATCHES_PASSED_TOTAL: IntCounter = register_int_counter_with_registry!(
        "infratest_job_watches_passed_total",
        "Total number of watched jobs that completed successfully.",
        REGISTRY
    )
    .expect("Failed to register WATCHES_PASSED_TOTAL");
    pub static ref WATCHES_FAILED_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        "infratest_job_watches_failed_total",
        "Total number of job watches that did not pass, by failure kind.",
        &["kind"],
        REGISTRY
    )
    .expect("Failed to register WATCHES_FAILED_TOTAL");
    pub static ref STATUS_QUERIES_TOTAL: IntCounter = register_int_counter_with_registry!(
        "infratest_job_status_queries_total",
        "Total number of job status queries issued.",
        REGISTRY
    )
    .expect("Failed to register STATUS_QUERIES_TOTAL");
}

pub fn record_outcome(outcome: &WatchOutcome) {
    match outcome.error() {
        None => WATCHES_PASSED_TOTAL.inc(),
        Some(error) => WATCHES_FAILED_TOTAL.with_label_values(&[error.kind()]).inc(),
    }
}

// Function to gather metrics for exposition
pub fn gather_metrics() -> String {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
