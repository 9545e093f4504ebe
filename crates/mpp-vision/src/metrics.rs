//! Detection metrics.
//!
//! Emitted through the `metrics` facade; the API server installs the
//! Prometheus recorder. Without a recorder these calls are no-ops.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const DETECTION_REQUESTS_TOTAL: &str = "mpp_detection_requests_total";
    pub const INFERENCE_DURATION_SECONDS: &str = "mpp_inference_duration_seconds";
    pub const DETECTIONS_TOTAL: &str = "mpp_detections_total";
    pub const UNKNOWN_LABELS_TOTAL: &str = "mpp_unknown_labels_total";
}

/// Record the outcome of one pipeline run (`ok` or an error kind).
pub fn record_detection_request(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::DETECTION_REQUESTS_TOTAL, &labels).increment(1);
}

/// Record time spent inside the backend.
pub fn record_inference_duration(backend: &'static str, duration_secs: f64) {
    let labels = [("backend", backend.to_string())];
    histogram!(names::INFERENCE_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record detections returned for a category.
pub fn record_detections(category: &str, count: u64) {
    let labels = [("category", category.to_string())];
    counter!(names::DETECTIONS_TOTAL, &labels).increment(count);
}

/// Record a raw label that had no category mapping.
pub fn record_unknown_label() {
    counter!(names::UNKNOWN_LABELS_TOTAL).increment(1);
}
