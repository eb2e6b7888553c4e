//! Prometheus metrics for the HTTP/SSE surface: name constants plus a
//! small set of free functions handlers call directly, covering exactly
//! the job-engine metrics this surface emits.

use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the process-wide Prometheus recorder and return a handle the
/// `/metrics` route renders from.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install prometheus recorder")
}

pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "aura_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "aura_http_request_duration_seconds";
    pub const JOBS_SUBMITTED_TOTAL: &str = "aura_jobs_submitted_total";
    pub const JOBS_ACTIVE: &str = "aura_jobs_active";
    pub const JOBS_TERMINAL_TOTAL: &str = "aura_jobs_terminal_total";
    pub const SSE_SUBSCRIBERS_ACTIVE: &str = "aura_sse_subscribers_active";
    pub const RATE_LIMIT_HITS_TOTAL: &str = "aura_rate_limit_hits_total";
}

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

pub fn set_active_jobs(count: i64) {
    gauge!(names::JOBS_ACTIVE).set(count as f64);
}

pub fn record_job_terminal(status: &str) {
    let labels = [("status", status.to_string())];
    counter!(names::JOBS_TERMINAL_TOTAL, &labels).increment(1);
}

pub fn set_active_sse_subscribers(count: i64) {
    gauge!(names::SSE_SUBSCRIBERS_ACTIVE).set(count as f64);
}

pub fn record_rate_limit_hit(path: &str) {
    let labels = [("path", sanitize_path(path))];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Collapse path parameters so cardinality stays bounded (job ids are
/// UUIDs; without this every job would mint its own metric series).
fn sanitize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.len() >= 16 || segment.chars().all(|c| c.is_ascii_hexdigit() || c == '-') && segment.len() > 8 {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Request-timing middleware, recording every response under its matched
/// route template (falling back to the raw path for unmatched routes).
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();
    let labels = [
        ("method", method),
        ("path", sanitize_path(&path)),
        ("status", status.to_string()),
    ];
    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration);

    response
}
