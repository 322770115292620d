//! Operation counters for the external scaler
//!
//! Counters are emitted as structured log events; there is no exporter.

use std::time::Duration;
use tracing::info;

/// Metrics collector for scaler operations
#[derive(Clone, Debug, Default)]
pub struct Metrics;

impl Metrics {
    /// Record the outcome of one query evaluation
    pub fn record_query(&self, operation: &str, outcome: &str, elapsed: Duration) {
        info!(
            operation = %operation,
            outcome = %outcome,
            elapsed_ms = elapsed.as_millis() as u64,
            "Recorded query"
        );
    }

    pub fn record_stream_opened(&self, target: &str) {
        info!(target_name = %target, "Recorded stream opened");
    }

    pub fn record_stream_closed(&self, target: &str, polls: u64, pushes: u64) {
        info!(
            target_name = %target,
            polls = polls,
            pushes = pushes,
            "Recorded stream closed"
        );
    }

    /// Record an activity notification pushed to a subscriber
    pub fn record_push(&self, target: &str) {
        info!(target_name = %target, "Recorded activity push");
    }
}
