// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the lbsync operator.
//!
//! All metrics carry the namespace prefix `lbsync_firestoned_io_` (prometheus-safe
//! version of "lbsync.firestoned.io").
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Outcome and duration of each reconcile
//! - **Backend Metrics** - Every adapter call and every session close, per vendor
//! - **Error Metrics** - Failed reconciles by category
//!
//! # Example
//!
//! ```rust,no_run
//! use lbsync::metrics::{record_backend_operation, record_reconciliation_success};
//!
//! record_backend_operation("f5", "create_pool", true);
//! record_reconciliation_success("ExternalLoadBalancer", std::time::Duration::from_secs(1));
//! ```

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all lbsync metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "lbsync_firestoned_io";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry, exposed via the `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn register_counter(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let counter = CounterVec::new(Opts::new(format!("{METRICS_NAMESPACE}_{name}"), help), labels)
        .expect("counter definition is valid");
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .expect("counter is registered once");
    counter
}

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliations by resource type and status
///
/// Labels:
/// - `resource_type`: Kind of resource (`ExternalLoadBalancer`)
/// - `status`: Outcome (`success`, `error`, `requeue`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter(
        "reconciliations_total",
        "Total number of reconciliations by resource type and status",
        &["resource_type", "status"],
    )
});

/// Duration of reconciliations in seconds
///
/// Labels:
/// - `resource_type`: Kind of resource
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by resource type",
    )
    .buckets(vec![0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]);
    let histogram =
        HistogramVec::new(opts, &["resource_type"]).expect("histogram definition is valid");
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .expect("histogram is registered once");
    histogram
});

/// Total number of requeue operations
///
/// Labels:
/// - `resource_type`: Kind of resource
/// - `reason`: Reason for requeue (`error`, `resync`)
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter(
        "requeues_total",
        "Total number of requeue operations by resource type and reason",
        &["resource_type", "reason"],
    )
});

// ============================================================================
// Backend Metrics
// ============================================================================

/// Total number of provider calls
///
/// Labels:
/// - `vendor`: Registered provider name
/// - `operation`: Adapter operation (`get_pool`, `create_pool_member`, ...)
/// - `result`: `success` or `error`
pub static BACKEND_OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter(
        "backend_operations_total",
        "Total number of load balancer provider calls by vendor, operation and result",
        &["vendor", "operation", "result"],
    )
});

/// Total number of closed backend sessions
///
/// Labels:
/// - `vendor`: Registered provider name
/// - `result`: `committed`, `rolled_back` or `failed`
pub static BACKEND_SESSIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter(
        "backend_sessions_total",
        "Total number of load balancer sessions closed by vendor and result",
        &["vendor", "result"],
    )
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of errors by resource type and error category
///
/// Labels:
/// - `resource_type`: Kind of resource
/// - `error_type`: Condition reason of the failure (`UnknownProvider`, ...)
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter(
        "errors_total",
        "Total number of errors by resource type and error category",
        &["resource_type", "error_type"],
    )
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful reconciliation
pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "error"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a reconciliation requeue
///
/// # Arguments
/// * `resource_type` - The kind of resource reconciled
/// * `reason` - Reason for requeue (e.g., `error`)
pub fn record_reconciliation_requeue(resource_type: &str, reason: &str) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "requeue"])
        .inc();
    REQUEUE_TOTAL
        .with_label_values(&[resource_type, reason])
        .inc();
}

/// Record one provider call
///
/// # Arguments
/// * `vendor` - Registered provider name
/// * `operation` - Snake-case operation name
/// * `success` - Whether the call succeeded
pub fn record_backend_operation(vendor: &str, operation: &str, success: bool) {
    let result = if success { "success" } else { "error" };
    BACKEND_OPERATIONS_TOTAL
        .with_label_values(&[vendor, operation, result])
        .inc();
}

/// Record the outcome of closing a backend session
pub fn record_backend_session(vendor: &str, result: &str) {
    BACKEND_SESSIONS_TOTAL
        .with_label_values(&[vendor, result])
        .inc();
}

/// Record an error
pub fn record_error(resource_type: &str, error_type: &str) {
    ERRORS_TOTAL
        .with_label_values(&[resource_type, error_type])
        .inc();
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_reconciliation_success() {
        let resource_type = "TestResource";
        record_reconciliation_success(resource_type, Duration::from_millis(500));

        let counter = RECONCILIATION_TOTAL.with_label_values(&[resource_type, "success"]);
        assert!(counter.get() > 0.0);

        let histogram = RECONCILIATION_DURATION_SECONDS.with_label_values(&[resource_type]);
        assert!(histogram.get_sample_count() > 0);
    }

    #[test]
    fn test_record_reconciliation_requeue() {
        let resource_type = "TestRequeue";
        record_reconciliation_requeue(resource_type, "error");

        let counter = REQUEUE_TOTAL.with_label_values(&[resource_type, "error"]);
        assert!(counter.get() > 0.0);
    }

    #[test]
    fn test_record_backend_operation() {
        record_backend_operation("metrics-test", "create_pool", true);
        record_backend_operation("metrics-test", "create_pool", false);
        record_backend_operation("metrics-test", "create_pool", false);

        let ok = BACKEND_OPERATIONS_TOTAL.with_label_values(&["metrics-test", "create_pool", "success"]);
        let failed = BACKEND_OPERATIONS_TOTAL.with_label_values(&["metrics-test", "create_pool", "error"]);
        assert!(ok.get() >= 1.0);
        assert!(failed.get() >= 2.0);
    }

    #[test]
    fn test_gather_metrics() {
        record_backend_session("gather-test", "committed");
        record_error("GatherTest", "ReconcileFailed");

        let metrics_text = gather_metrics().unwrap();
        assert!(metrics_text.contains("lbsync_firestoned_io"));
        assert!(metrics_text.contains("backend_sessions_total"));
        assert!(metrics_text.contains("errors_total"));
    }
}
