//! Liveness/readiness handlers. This core has no external store or queue
//! to probe; the one thing worth checking before declaring readiness is
//! that the configured encoder is actually reachable.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// GET /health, /healthz — liveness probe. Always returns 200 once the
/// process is up; it says nothing about encoder reachability.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub encoder: CheckStatus,
    pub store: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// GET /ready — readiness probe: the encoder binary must be reachable
/// (cached by `probe_encoder` after the first check) and the store
/// must not be draining. A `ready=false` readiness response is how a load
/// balancer learns to stop sending this instance new submissions while it
/// winds down.
pub async fn ready(State(state): State<AppState>) -> Json<ReadinessResponse> {
    let encoder = match aura_validate::pregen::probe_encoder(&state.engine_config.encoder_binary).await {
        Ok(info) => CheckStatus {
            status: "ok".to_string(),
            detail: Some(info.version_line),
        },
        Err(reason) => CheckStatus {
            status: "error".to_string(),
            detail: Some(reason),
        },
    };

    let draining = state.orchestrator.store.is_draining();
    let store = CheckStatus {
        status: if draining { "draining" } else { "ok" }.to_string(),
        detail: None,
    };

    let overall_ok = encoder.status == "ok" && !draining;
    Json(ReadinessResponse {
        status: if overall_ok { "ready" } else { "not_ready" }.to_string(),
        checks: ReadinessChecks { encoder, store },
    })
}
