// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; without an installed recorder every call is
//! a no-op.

use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Herald metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("herald_messages_sent_total", "Messages accepted by the provider");
    describe_counter!(
        "herald_messages_failed_total",
        "Send attempts that failed, by error code"
    );
    describe_counter!("herald_retries_scheduled_total", "Recipient retries scheduled");
    describe_counter!(
        "herald_retries_exhausted_total",
        "Recipients that ran out of retries"
    );
    describe_counter!(
        "herald_quota_denials_total",
        "Sends refused by the usage guard, by limit"
    );
    describe_counter!("herald_batches_finished_total", "Batches settled, by status");
    describe_gauge!("herald_active_batches", "Batches currently being processed");
    describe_histogram!(
        "herald_send_latency_seconds",
        "Provider send latency in seconds"
    );
}

pub fn record_sent(provider: &str) {
    metrics::counter!("herald_messages_sent_total", "provider" => provider.to_string())
        .increment(1);
}

pub fn record_failed(code: &str) {
    metrics::counter!("herald_messages_failed_total", "code" => code.to_string()).increment(1);
}

pub fn record_retry_scheduled() {
    metrics::counter!("herald_retries_scheduled_total").increment(1);
}

pub fn record_retry_exhausted() {
    metrics::counter!("herald_retries_exhausted_total").increment(1);
}

pub fn record_quota_denied(reason: &str) {
    metrics::counter!("herald_quota_denials_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_batch_finished(status: &str) {
    metrics::counter!("herald_batches_finished_total", "status" => status.to_string())
        .increment(1);
}

pub fn adjust_active_batches(delta: f64) {
    metrics::gauge!("herald_active_batches").increment(delta);
}

pub fn record_send_latency(seconds: f64) {
    metrics::histogram!("herald_send_latency_seconds").record(seconds);
}
