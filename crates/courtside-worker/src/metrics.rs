//! Prometheus metrics for match runs.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{WorkerError, WorkerResult};

/// Install the Prometheus recorder. The handle renders the current values.
pub fn init_metrics() -> WorkerResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| WorkerError::internal(format!("Failed to install Prometheus recorder: {}", e)))
}

/// Metric names as constants for consistency.
pub mod names {
    // Run metrics
    pub const RUNS_TOTAL: &str = "courtside_runs_total";
    pub const RUN_DURATION_SECONDS: &str = "courtside_run_duration_seconds";
    pub const RUNS_IN_FLIGHT: &str = "courtside_runs_in_flight";

    // Frame metrics
    pub const FRAMES_PROCESSED_TOTAL: &str = "courtside_frames_processed_total";
    pub const FRAMES_SKIPPED_TOTAL: &str = "courtside_frames_skipped_total";
    pub const BALL_DETECTION_RATE: &str = "courtside_ball_detection_rate";

    // Analytics metrics
    pub const SHOTS_TOTAL: &str = "courtside_shots_total";
    pub const RALLIES_TOTAL: &str = "courtside_rallies_total";
    pub const HIGHLIGHT_FAILURES_TOTAL: &str = "courtside_highlight_failures_total";
    pub const PERSIST_DURATION_SECONDS: &str = "courtside_persist_duration_seconds";
}

/// Record a finished run; `outcome` is `completed` or an error kind.
pub fn record_run(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::RUNS_TOTAL, &labels).increment(1);
    histogram!(names::RUN_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_run_started() {
    gauge!(names::RUNS_IN_FLIGHT).increment(1.0);
}

pub fn record_run_finished() {
    gauge!(names::RUNS_IN_FLIGHT).decrement(1.0);
}

pub fn record_frames(processed: u64, skipped: u64) {
    counter!(names::FRAMES_PROCESSED_TOTAL).increment(processed);
    counter!(names::FRAMES_SKIPPED_TOTAL).increment(skipped);
}

pub fn record_ball_detection_rate(rate: f64) {
    gauge!(names::BALL_DETECTION_RATE).set(rate);
}

pub fn record_analytics(classifier: &str, shots: usize, rallies: usize) {
    let labels = [("classifier", classifier.to_string())];
    counter!(names::SHOTS_TOTAL, &labels).increment(shots as u64);
    counter!(names::RALLIES_TOTAL).increment(rallies as u64);
}

pub fn record_highlight_failure() {
    counter!(names::HIGHLIGHT_FAILURES_TOTAL).increment(1);
}

pub fn record_persist(sink: &str, success: bool, duration_secs: f64) {
    let labels = [
        ("sink", sink.to_string()),
        ("success", success.to_string()),
    ];
    histogram!(names::PERSIST_DURATION_SECONDS, &labels).record(duration_secs);
}
