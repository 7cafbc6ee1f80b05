//! Prometheus metrics for nexus.
//!
//! Covers:
//! - Event bus dispatch and handler faults
//! - Feed connection state, reconnects and abandonment
//! - Feed message decoding
//! - Store tick application
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a startup bug rather than a runtime
//! condition.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_vec, register_int_gauge_vec, Encoder, IntCounterVec, IntGaugeVec,
    TextEncoder,
};

/// Events published on the bus.
pub static EVENTS_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "nexus_events_published_total",
        "Events published on the event bus",
        &["kind"]
    )
    .unwrap()
});

/// Handler errors and panics caught by the bus.
pub static HANDLER_FAULTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "nexus_handler_faults_total",
        "Event handler errors or panics isolated by the bus",
        &["kind"]
    )
    .unwrap()
});

/// Feed connection state (1 = current state).
pub static FEED_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "nexus_feed_state",
        "Feed connection state machine (1=active, 0=inactive)",
        &["id", "state"]
    )
    .unwrap()
});

/// Reconnect attempts scheduled.
pub static FEED_RECONNECT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "nexus_feed_reconnect_total",
        "Feed reconnect attempts scheduled",
        &["id"]
    )
    .unwrap()
});

/// Connections abandoned after exhausting the retry budget.
pub static FEED_ABANDONED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "nexus_feed_abandoned_total",
        "Feed connections abandoned after max reconnect attempts",
        &["id"]
    )
    .unwrap()
});

/// Decoded feed messages.
pub static FEED_MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "nexus_feed_messages_total",
        "Feed messages decoded and published",
        &["id", "kind"]
    )
    .unwrap()
});

/// Feed messages dropped because they could not be decoded.
pub static FEED_PARSE_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "nexus_feed_parse_errors_total",
        "Feed messages dropped on decode failure",
        &["id"]
    )
    .unwrap()
});

/// Ticks applied to the market store.
pub static TICKS_APPLIED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "nexus_ticks_applied_total",
        "Ticks applied to the market store",
        &["symbol"]
    )
    .unwrap()
});

/// Every state label the feed gauge knows about.
const FEED_STATES: &[&str] = &[
    "disconnected",
    "connecting",
    "open",
    "closing",
    "reconnect_scheduled",
    "abandoned",
];

/// Metric recording facade.
pub struct Metrics;

impl Metrics {
    /// Record an event publish.
    pub fn event_published(kind: &str) {
        EVENTS_PUBLISHED_TOTAL.with_label_values(&[kind]).inc();
    }

    /// Record a handler fault.
    pub fn handler_fault(kind: &str) {
        HANDLER_FAULTS_TOTAL.with_label_values(&[kind]).inc();
    }

    /// Set the feed state for `id`; all other states go to 0.
    pub fn feed_state_set(id: &str, state: &str) {
        for s in FEED_STATES {
            FEED_STATE.with_label_values(&[id, s]).set(0);
        }
        FEED_STATE.with_label_values(&[id, state]).set(1);
    }

    pub fn feed_reconnect(id: &str) {
        FEED_RECONNECT_TOTAL.with_label_values(&[id]).inc();
    }

    pub fn feed_abandoned(id: &str) {
        FEED_ABANDONED_TOTAL.with_label_values(&[id]).inc();
    }

    pub fn feed_message(id: &str, kind: &str) {
        FEED_MESSAGES_TOTAL.with_label_values(&[id, kind]).inc();
    }

    pub fn feed_parse_error(id: &str) {
        FEED_PARSE_ERRORS_TOTAL.with_label_values(&[id]).inc();
    }

    pub fn tick_applied(symbol: &str) {
        TICKS_APPLIED_TOTAL.with_label_values(&[symbol]).inc();
    }

    /// Render the default registry in Prometheus text format.
    pub fn gather_text() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let families = prometheus::gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_fault_counter() {
        let before = HANDLER_FAULTS_TOTAL
            .with_label_values(&["test:kind"])
            .get();
        Metrics::handler_fault("test:kind");
        let after = HANDLER_FAULTS_TOTAL
            .with_label_values(&["test:kind"])
            .get();
        assert_eq!(after, before + 1);
    }

    #[test]
    fn test_feed_state_is_exclusive() {
        Metrics::feed_state_set("metrics-test", "connecting");
        Metrics::feed_state_set("metrics-test", "open");

        assert_eq!(
            FEED_STATE
                .with_label_values(&["metrics-test", "open"])
                .get(),
            1
        );
        assert_eq!(
            FEED_STATE
                .with_label_values(&["metrics-test", "connecting"])
                .get(),
            0
        );
    }

    #[test]
    fn test_gather_text_contains_metric() {
        Metrics::event_published("test:gather");
        let text = Metrics::gather_text().unwrap();
        assert!(text.contains("nexus_events_published_total"));
    }
}
