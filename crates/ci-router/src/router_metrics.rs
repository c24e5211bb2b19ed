//! Prometheus metrics for the ingester
//!
//! Mirrors the per-concept outcome counters onto the `metrics` facade so they
//! are scraped from `/metrics`, alongside consumer activity.

use metrics::{counter, histogram};
use std::time::Duration;

/// Record the outcome of one write
pub fn record_write(concept: &str, target: &str, success: bool) {
    counter!(
        "concept_ingester_writes_total",
        "concept" => concept.to_string(),
        "target" => target.to_string(),
        "result" => if success { "success" } else { "failure" }
    )
    .increment(1);
}

/// Record how long a write took, including reading the response
pub fn record_write_latency(concept: &str, target: &str, duration: Duration) {
    histogram!(
        "concept_ingester_write_duration_seconds",
        "concept" => concept.to_string(),
        "target" => target.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a message handed to the router
pub fn record_message_received(stream: &str) {
    counter!(
        "concept_ingester_messages_received_total",
        "stream" => stream.to_string()
    )
    .increment(1);
}

/// Record a failed poll against the queue
pub fn record_poll_error(stream: &str) {
    counter!(
        "concept_ingester_poll_errors_total",
        "stream" => stream.to_string()
    )
    .increment(1);
}

/// Record a failed offset commit
pub fn record_commit_error(stream: &str) {
    counter!(
        "concept_ingester_commit_errors_total",
        "stream" => stream.to_string()
    )
    .increment(1);
}

/// Record time spent waiting on the throttle
pub fn record_throttle_wait(duration: Duration) {
    histogram!("concept_ingester_throttle_wait_seconds").record(duration.as_secs_f64());
}
