//! Prometheus metrics for the gateway.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "cdn_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "cdn_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "cdn_http_requests_in_flight";

    // Cache metrics
    pub const CACHE_LOOKUPS_TOTAL: &str = "cdn_cache_lookups_total";
    pub const CACHE_PROMOTIONS_TOTAL: &str = "cdn_cache_promotions_total";

    // Delivery metrics
    pub const PROCESSING_DURATION_SECONDS: &str = "cdn_processing_duration_seconds";
    pub const RESPONSES_TOTAL: &str = "cdn_responses_total";

    // Background telemetry
    pub const TELEMETRY_DROPPED_TOTAL: &str = "cdn_telemetry_dropped_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "cdn_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a rendition cache lookup.
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(names::CACHE_LOOKUPS_TOTAL, "result" => result).increment(1);
}

/// Record a rendition being persisted.
pub fn record_cache_promotion() {
    counter!(names::CACHE_PROMOTIONS_TOTAL).increment(1);
}

/// Record time spent in a processor.
pub fn record_processing_duration(processor: &str, duration_secs: f64) {
    let labels = [("processor", processor.to_string())];
    histogram!(names::PROCESSING_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a delivered CDN response by kind (`redirect`, `stream`, `not_modified`).
pub fn record_response(kind: &'static str) {
    counter!(names::RESPONSES_TOTAL, "kind" => kind).increment(1);
}

/// Record a background counter update dropped at the in-flight cap.
pub fn record_telemetry_dropped(task: &'static str) {
    counter!(names::TELEMETRY_DROPPED_TOTAL, "task" => task).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Collapse per-share paths so tokens and filenames never become labels.
fn sanitize_path(path: &str) -> String {
    if path == "/cdn" || path.starts_with("/cdn/") {
        "/cdn/:token".to_string()
    } else {
        path.to_string()
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/cdn/AbCdEf123456/w_800,h_600/photo.jpg"),
            "/cdn/:token"
        );
        assert_eq!(sanitize_path("/cdn/AbCdEf123456/photo.jpg"), "/cdn/:token");
        assert_eq!(sanitize_path("/health"), "/health");
        assert_eq!(sanitize_path("/cdnx"), "/cdnx");
    }
}
