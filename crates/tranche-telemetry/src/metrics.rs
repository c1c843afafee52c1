//! Prometheus metrics for tranche.
//!
//! Covers:
//! - Order generation and skipped levels
//! - Dispatch outcomes and in-flight work
//! - Broker submission attempts and latency
//! - Status sync transitions
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A failure means duplicate metric
//! names, which is a startup bug; it only happens during static
//! initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, HistogramVec,
    IntGauge,
};

/// Order drafts produced by the generator.
/// Labels: direction (buy/sell)
pub static ORDERS_GENERATED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tranche_orders_generated_total",
        "Order drafts produced by the generator",
        &["direction"]
    )
    .unwrap()
});

/// Levels skipped during generation.
/// Labels: reason
pub static LEVELS_SKIPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tranche_levels_skipped_total",
        "Generation levels skipped",
        &["reason"]
    )
    .unwrap()
});

/// Dispatch outcomes.
/// Labels: outcome (sent/error/skipped)
pub static DISPATCH_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tranche_dispatch_total",
        "Dispatch outcomes per order",
        &["outcome"]
    )
    .unwrap()
});

/// Individual broker submission attempts.
/// Labels: result (ok/retryable/fatal)
pub static SUBMISSION_ATTEMPTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tranche_submission_attempts_total",
        "Broker submission attempts",
        &["result"]
    )
    .unwrap()
});

/// End-to-end submission latency in milliseconds, retries included.
pub static SUBMISSION_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "tranche_submission_latency_ms",
        "Broker submission latency in milliseconds",
        &["outcome"],
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .unwrap()
});

/// Orders currently held in the pending index.
pub static PENDING_INDEX_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "tranche_pending_index_size",
        "Orders held in the pending time index"
    )
    .unwrap()
});

/// Orders claimed by a dispatch task and not yet finished.
pub static IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("tranche_in_flight", "Orders with an active dispatch task").unwrap()
});

/// Status sync transitions.
/// Labels: status (executed/rejected/cancelled)
pub static STATUS_SYNC_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tranche_status_sync_total",
        "Orders moved to a final state by status sync",
        &["status"]
    )
    .unwrap()
});

/// Metrics helper for recording events.
pub struct Metrics;

impl Metrics {
    /// Record a generated draft.
    pub fn order_generated(direction: &str) {
        ORDERS_GENERATED_TOTAL.with_label_values(&[direction]).inc();
    }

    /// Record a skipped level.
    pub fn level_skipped(reason: &str) {
        LEVELS_SKIPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn dispatch_sent() {
        DISPATCH_TOTAL.with_label_values(&["sent"]).inc();
    }

    pub fn dispatch_error() {
        DISPATCH_TOTAL.with_label_values(&["error"]).inc();
    }

    /// Record an order dropped before submission (cancelled or gone).
    pub fn dispatch_skipped() {
        DISPATCH_TOTAL.with_label_values(&["skipped"]).inc();
    }

    /// Record one broker attempt.
    pub fn submission_attempt(result: &str) {
        SUBMISSION_ATTEMPTS_TOTAL.with_label_values(&[result]).inc();
    }

    /// Record submission latency.
    pub fn submission_latency(outcome: &str, latency_ms: f64) {
        SUBMISSION_LATENCY_MS
            .with_label_values(&[outcome])
            .observe(latency_ms);
    }

    pub fn set_index_size(size: usize) {
        PENDING_INDEX_SIZE.set(i64::try_from(size).unwrap_or(i64::MAX));
    }

    pub fn in_flight_inc() {
        IN_FLIGHT.inc();
    }

    pub fn in_flight_dec() {
        IN_FLIGHT.dec();
    }

    /// Record a status sync transition.
    pub fn status_synced(status: &str) {
        STATUS_SYNC_TOTAL.with_label_values(&[status]).inc();
    }
}
