//! HTTP route table: a nest-then-layer router collapsed to the one
//! resource this surface exposes (`/jobs`) plus the operational routes
//! every service needs (health, readiness, metrics).

use axum::error_handling::HandleErrorLayer;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower::timeout::TimeoutLayer;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::health::{health, ready};
use crate::handlers::jobs::{cancel_job, get_job, list_jobs, submit_job, subscribe_events};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, handle_timeout_error, rate_limit_middleware, request_id, request_logging, security_headers,
};
use crate::state::AppState;

pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/jobs", post(submit_job).get(list_jobs))
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/cancel", post(cancel_job))
        .route("/jobs/:job_id/events", get(subscribe_events));

    let rate_limiter = crate::middleware::create_rate_limiter(state.config.rate_limit_rps);

    let api_routes = Router::new()
        .merge(job_routes)
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let request_timeout = state.config.request_timeout;
    let max_body_size = state.config.max_body_size;

    Router::new()
        .nest("/api/v1", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}
