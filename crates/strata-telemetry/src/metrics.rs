//! Prometheus metrics for the strata bot.
//!
//! Covers the relay connection, order flow through the executor and
//! tracker, and strategy run lifecycle.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. If registration fails,
//! it indicates a fatal configuration error (e.g., duplicate metric names)
//! that should cause an immediate crash at startup rather than silent failure.
//! These panics only occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram_vec,
    register_int_counter, register_int_gauge, CounterVec, Gauge, GaugeVec, HistogramVec,
    IntCounter, IntGauge,
};

/// Relay connection state (1 = connected, 0 = disconnected).
pub static RELAY_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!(
        "strata_relay_connected",
        "User-data stream connection state (1=connected)"
    )
    .unwrap()
});

/// Relay state machine current state.
/// Labels: state (disconnected/connecting/connected/reconnecting)
pub static RELAY_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "strata_relay_state",
        "Relay state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Total relay reconnection attempts.
pub static RELAY_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "strata_relay_reconnect_total",
        "Total user-data stream reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Total relay events published by type.
/// Labels: kind (order_update/balance_update/unknown)
pub static RELAY_EVENTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "strata_relay_events_total",
        "Total normalized stream events published",
        &["kind"]
    )
    .unwrap()
});

/// Total payloads the relay failed to decode.
pub static RELAY_DECODE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "strata_relay_decode_failures_total",
        "Total stream payloads that failed normalization"
    )
    .unwrap()
});

/// Total order submissions by outcome.
/// Labels: outcome (accepted/rejected/budget_exhausted)
pub static ORDERS_SUBMITTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "strata_orders_submitted_total",
        "Total order submissions by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Total submission retries after transient errors.
pub static ORDER_RETRIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "strata_order_retries_total",
        "Total order submission retries after transient errors"
    )
    .unwrap()
});

/// Total cancel requests by outcome.
/// Labels: outcome (accepted/rejected)
pub static CANCELS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "strata_cancels_total",
        "Total cancel requests by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Submission round-trip latency in milliseconds.
pub static SUBMIT_LATENCY_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "strata_submit_latency_ms",
        "Order submission round-trip latency in milliseconds",
        &["order_type"],
        vec![5.0, 10.0, 20.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0]
    )
    .unwrap()
});

/// Currently tracked non-terminal orders.
pub static OPEN_ORDERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "strata_open_orders",
        "Currently tracked non-terminal orders"
    )
    .unwrap()
});

/// Total order state transitions.
/// Labels: to (new/partially_filled/filled/canceled/rejected/expired)
pub static ORDER_TRANSITIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "strata_order_transitions_total",
        "Total order state transitions applied",
        &["to"]
    )
    .unwrap()
});

/// Strategy runs by terminal outcome.
/// Labels: strategy (twap/grid), outcome
pub static STRATEGY_RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "strata_strategy_runs_total",
        "Total strategy runs by terminal outcome",
        &["strategy", "outcome"]
    )
    .unwrap()
});

/// Currently active strategy runs.
pub static ACTIVE_RUNS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("strata_active_runs", "Currently active strategy runs").unwrap()
});

/// Total grid level re-arms after fills.
pub static GRID_REARMS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "strata_grid_rearms_total",
        "Total grid levels re-armed after a fill"
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    pub fn relay_connected() {
        RELAY_CONNECTED.set(1.0);
    }

    pub fn relay_disconnected() {
        RELAY_CONNECTED.set(0.0);
    }

    /// Set relay state machine state.
    /// Only the active state should be set to 1, all others to 0.
    pub fn relay_state_set(state: &str) {
        for s in &["disconnected", "connecting", "connected", "reconnecting"] {
            RELAY_STATE.with_label_values(&[s]).set(0.0);
        }
        RELAY_STATE.with_label_values(&[state]).set(1.0);
    }

    pub fn relay_reconnect(reason: &str) {
        RELAY_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn relay_event(kind: &str) {
        RELAY_EVENTS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn relay_decode_failure() {
        RELAY_DECODE_FAILURES_TOTAL.inc();
    }

    pub fn order_submitted(outcome: &str) {
        ORDERS_SUBMITTED_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn order_retry() {
        ORDER_RETRIES_TOTAL.inc();
    }

    pub fn cancel(outcome: &str) {
        CANCELS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn submit_latency(order_type: &str, latency_ms: f64) {
        SUBMIT_LATENCY_MS
            .with_label_values(&[order_type])
            .observe(latency_ms);
    }

    pub fn open_orders_set(count: i64) {
        OPEN_ORDERS.set(count);
    }

    pub fn order_transition(to: &str) {
        ORDER_TRANSITIONS_TOTAL.with_label_values(&[to]).inc();
    }

    pub fn run_finished(strategy: &str, outcome: &str) {
        STRATEGY_RUNS_TOTAL
            .with_label_values(&[strategy, outcome])
            .inc();
    }

    pub fn active_runs_set(count: i64) {
        ACTIVE_RUNS.set(count);
    }

    pub fn grid_rearm() {
        GRID_REARMS_TOTAL.inc();
    }
}
