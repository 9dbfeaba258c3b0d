//! Firestore metrics collection.
//!
//! - Request counters by operation and status
//! - Latency histograms
//! - Auth token refreshes

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total Firestore requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "firestore_requests_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "firestore_latency_seconds";

    /// Access token refreshes forced by an expired-token response.
    pub const TOKEN_REFRESHES_TOTAL: &str = "firestore_token_refreshes_total";
}

/// Record metrics for a completed Firestore request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

pub fn record_token_refresh() {
    counter!(names::TOKEN_REFRESHES_TOTAL).increment(1);
}
