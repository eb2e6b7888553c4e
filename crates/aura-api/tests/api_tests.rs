//! API integration tests: full-router `oneshot` requests against
//! `create_router`, wired to reference (offline) providers end to end.

use std::sync::Arc;

use aura_api::{create_router, ApiConfig, AppState};
use aura_orchestrator::EngineConfig;
use aura_orchestrator::Providers;
use aura_process::ProcessSupervisor;
use aura_providers::reference::{
    MockVideoEncoderProvider, NullTtsProvider, PlaceholderImageProvider, RuleBasedLlmProvider,
};
use aura_providers::registry::ProviderRegistryBuilder;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

/// One reference provider per category, all offline-capable, matching the
/// set `aura-api::main`'s `build_providers` falls back to when ffmpeg isn't
/// on `PATH`. `tempfile::TempDir` must outlive the router or the work/logs
/// dirs it names vanish mid-test.
fn test_app() -> (axum::Router, tempfile::TempDir) {
    let work_dir = tempfile::tempdir().expect("tempdir");

    let providers = Providers {
        llm: ProviderRegistryBuilder::new()
            .register("rule-based", Arc::new(RuleBasedLlmProvider::new()))
            .build(),
        tts: ProviderRegistryBuilder::new()
            .register("null", Arc::new(NullTtsProvider::new()))
            .build(),
        image: ProviderRegistryBuilder::new()
            .register("placeholder", Arc::new(PlaceholderImageProvider::new()))
            .build(),
        encoder: ProviderRegistryBuilder::new()
            .register("mock", Arc::new(MockVideoEncoderProvider::new()))
            .build(),
    };

    let mut engine_config = EngineConfig::default();
    // "true" always exits 0 and ignores "-version"; probe_encoder only reads
    // stdout lines, never checks the exit status, so this is reachable on
    // every POSIX test runner without requiring a real ffmpeg install.
    engine_config.encoder_binary = "true".to_string();
    engine_config.work_dir = work_dir.path().to_string_lossy().to_string();
    engine_config.logs_dir = work_dir.path().join("logs").to_string_lossy().to_string();

    let api_config = ApiConfig::default();
    let state = AppState::new(api_config, engine_config, Arc::new(providers), ProcessSupervisor::new());
    (create_router(state, None), work_dir)
}

fn valid_submission_body() -> Value {
    json!({
        "brief": {
            "topic": "Rust ownership",
            "audience": "beginners",
            "goal": "teach",
            "tone": "friendly",
            "language": "English",
            "aspect": "widescreen_16x9"
        },
        "plan": {
            "duration_secs": 30,
            "pacing": "conversational",
            "density": "balanced",
            "style": "explainer"
        },
        "voice": {
            "voice_name": "default",
            "rate": 1.0,
            "pitch": 1.0,
            "pause_style": "natural"
        },
        "render": {
            "width": 1280,
            "height": 720,
            "container": "mp4",
            "video_codec": "h264",
            "fps": 30,
            "video_kbps": 4000,
            "audio_kbps": 128,
            "quality": 75,
            "enable_scene_cut": false
        },
        "offline_only": true,
        "tier": "free"
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.expect("read body");
    serde_json::from_slice(&bytes).expect("valid json body")
}

#[tokio::test]
async fn health_endpoint_reports_healthy() {
    let (app, _work_dir) = test_app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn security_headers_are_present_on_every_response() {
    let (app, _work_dir) = test_app();

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let headers = response.headers();
    assert!(headers.contains_key("X-Content-Type-Options"));
    assert!(headers.contains_key("X-Frame-Options"));
    assert!(headers.contains_key("X-Request-ID"));
}

#[tokio::test]
async fn readiness_reports_ready_when_the_encoder_is_reachable() {
    let (app, _work_dir) = test_app();

    let response = app
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["checks"]["encoder"]["status"], "ok");
    assert_eq!(body["checks"]["store"]["status"], "ok");
}

#[tokio::test]
async fn submitting_a_valid_job_is_accepted_and_becomes_queryable() {
    let (app, _work_dir) = test_app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/jobs")
                .header("content-type", "application/json")
                .body(Body::from(valid_submission_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let submitted = body_json(response).await;
    let job_id = submitted["job_id"].as_str().expect("job_id present").to_string();
    assert_eq!(submitted["status"], "Queued");

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/jobs/{job_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let job = body_json(response).await;
    assert_eq!(job["id"], job_id);
}

#[tokio::test]
async fn submitting_a_job_with_an_out_of_range_duration_is_rejected() {
    let (app, _work_dir) = test_app();

    let mut body = valid_submission_body();
    body["plan"]["duration_secs"] = json!(0);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/jobs")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert_eq!(error["error_code"], "E303");
}

#[tokio::test]
async fn canceling_a_job_is_idempotent() {
    let (app, _work_dir) = test_app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/jobs")
                .header("content-type", "application/json")
                .body(Body::from(valid_submission_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let submitted = body_json(response).await;
    let job_id = submitted["job_id"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/jobs/{job_id}/cancel"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn listing_jobs_paginates() {
    let (app, _work_dir) = test_app();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/jobs")
                    .header("content-type", "application/json")
                    .body(Body::from(valid_submission_body().to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/jobs?page=0&page_size=1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed["total"], 2);
    assert_eq!(listed["jobs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn an_unknown_job_id_returns_not_found() {
    let (app, _work_dir) = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/jobs/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn subscribing_to_a_known_job_opens_an_event_stream() {
    let (app, _work_dir) = test_app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/jobs")
                .header("content-type", "application/json")
                .body(Body::from(valid_submission_body().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let submitted = body_json(response).await;
    let job_id = submitted["job_id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/jobs/{job_id}/events"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").map(|v| v.as_bytes()),
        Some(b"text/event-stream".as_slice())
    );
}
