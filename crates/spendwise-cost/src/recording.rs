// SPDX-FileCopyrightText: 2026 Spendwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder can collect these.
//! Without a recorder every call is a no-op.

use metrics::{describe_counter, describe_gauge};
use spendwise_core::{Severity, UsageEvent};

/// Register all Spendwise metric descriptions.
///
/// Call once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("spendwise_events_total", "Usage events recorded");
    describe_counter!("spendwise_tokens_total", "Tokens recorded across all events");
    describe_gauge!(
        "spendwise_cost_usd_total",
        "Cumulative recorded cost in USD"
    );
    describe_counter!("spendwise_alerts_total", "Alerts fired");
    describe_counter!(
        "spendwise_dispatch_failures_total",
        "Alert deliveries that failed or timed out"
    );
    describe_gauge!(
        "spendwise_budget_projected_usd",
        "Projected end-of-period spend per budget"
    );
}

/// Record one ingested usage event.
pub fn record_event(event: &UsageEvent) {
    metrics::counter!("spendwise_events_total", "model" => event.model.clone()).increment(1);
    metrics::counter!("spendwise_tokens_total", "model" => event.model.clone(), "type" => "input")
        .increment(event.input_tokens);
    metrics::counter!("spendwise_tokens_total", "model" => event.model.clone(), "type" => "output")
        .increment(event.output_tokens);
    metrics::gauge!("spendwise_cost_usd_total", "model" => event.model.clone())
        .increment(event.cost.usd());
}

/// Record a fired alert.
pub fn record_alert(rule_id: &str, severity: Severity) {
    metrics::counter!(
        "spendwise_alerts_total",
        "rule" => rule_id.to_string(),
        "severity" => severity.to_string()
    )
    .increment(1);
}

/// Record a failed channel delivery.
pub fn record_dispatch_failure(channel: &str) {
    metrics::counter!("spendwise_dispatch_failures_total", "channel" => channel.to_string())
        .increment(1);
}

/// Publish the projected total for one budget slot.
pub fn set_budget_projected(slot: &str, usd: f64) {
    metrics::gauge!("spendwise_budget_projected_usd", "budget" => slot.to_string()).set(usd);
}
