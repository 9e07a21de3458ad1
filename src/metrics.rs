//! Prometheus metrics for the request lifecycle.
//!
//! Exposes a standard `/metrics` endpoint that Prometheus can scrape.
//! All metrics live in the global default registry and are registered once.

use once_cell::sync::Lazy;
use prometheus::{
    opts, register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

use crate::models::request::RequestStatus;

struct Metrics {
    requests_created_total: IntCounter,
    decisions_total: IntCounterVec,
    relay_publishes_total: IntCounterVec,
}

static METRICS: Lazy<Metrics> = Lazy::new(|| Metrics {
    requests_created_total: register_int_counter!(opts!(
        "approvals_requests_created_total",
        "Total number of approval requests created"
    ))
    .expect("failed to register approvals_requests_created_total"),

    decisions_total: register_int_counter_vec!(
        opts!("approvals_decisions_total", "Total status updates by resulting status"),
        &["status"]
    )
    .expect("failed to register approvals_decisions_total"),

    relay_publishes_total: register_int_counter_vec!(
        opts!(
            "approvals_relay_publishes_total",
            "Relay publishes by notification type and outcome"
        ),
        &["type", "outcome"]
    )
    .expect("failed to register approvals_relay_publishes_total"),
});

pub fn record_created() {
    METRICS.requests_created_total.inc();
}

pub fn record_decision(status: RequestStatus) {
    METRICS
        .decisions_total
        .with_label_values(&[status.as_str()])
        .inc();
}

pub fn record_publish(kind: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "failed" };
    METRICS
        .relay_publishes_total
        .with_label_values(&[kind, outcome])
        .inc();
}

/// Encode all registered metrics as Prometheus text format.
/// Called by the `/metrics` HTTP handler.
pub fn encode_metrics() -> String {
    Lazy::force(&METRICS);
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}
