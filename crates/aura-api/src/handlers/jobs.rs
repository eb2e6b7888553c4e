//! Job submission, inspection, cancellation, and event-stream handlers.
//! The event stream rides Server-Sent Events rather than a websocket:
//! `EventBus::subscribe` is already a plain ordered stream, and there's no
//! client-to-server direction worth carrying.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::info;

use aura_orchestrator::select_chain;
use aura_providers::registry::manifests;
use aura_types::{
    Brief, CorrelationId, EventId, Job, JobId, PlanSpec, RenderSpec, RequestedTier, SystemProfile,
    VoiceSpec,
};
use aura_validate::pregen::validate_request;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// POST /jobs request body. Mirrors "Submit job" field-for-field;
/// `tier`/`offline_only` fall back to the engine's configured defaults when
/// the caller omits them.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub brief: Brief,
    pub plan: PlanSpec,
    pub voice: VoiceSpec,
    pub render: RenderSpec,
    #[serde(default)]
    pub system_profile: Option<SystemProfile>,
    #[serde(default)]
    pub offline_only: Option<bool>,
    #[serde(default)]
    pub tier: Option<RequestedTier>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub correlation_id: String,
    pub status: &'static str,
    pub percent: u8,
}

/// POST /jobs — validate the request, then accept the job and hand it to the
/// orchestrator. No `Job` is created, and no events are produced, unless
/// validation passes.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(request): Json<SubmitJobRequest>,
) -> ApiResult<Json<SubmitJobResponse>> {
    if state.orchestrator.store.is_draining() {
        return Err(ApiError::bad_request("the engine is draining and not accepting new jobs"));
    }

    let offline_only = request.offline_only.unwrap_or(state.engine_config.default_offline_only);
    let tier = request.tier.unwrap_or(state.engine_config.default_tier);
    let correlation_id = request
        .correlation_id
        .map(CorrelationId)
        .unwrap_or_else(CorrelationId::new);
    let system_profile = request.system_profile.unwrap_or(SystemProfile {
        logical_cores: num_cpus_fallback(),
        physical_cores: num_cpus_fallback(),
        ram_gib: 8,
        gpu: None,
    });

    let llm_manifests = manifests(&state.providers.llm, |p| p.manifest().clone());
    let tts_manifests = manifests(&state.providers.tts, |p| p.manifest().clone());
    let image_manifests = manifests(&state.providers.image, |p| p.manifest().clone());
    let encoder_manifests = manifests(&state.providers.encoder, |p| p.manifest().clone());

    // Script and render have no graceful-degradation path (each stage's
    // failure policy fails the job outright), so their absence is a hard
    // validation issue. Voice and visuals degrade to silent narration or
    // placeholder assets at runtime, so their absence is only a warning
    // here.
    let providers_available = [
        ("script", stage_has_a_provider(&llm_manifests, tier, offline_only)),
        ("render", stage_has_a_provider(&encoder_manifests, tier, offline_only)),
    ];

    let mut validation = validate_request(
        &request.brief,
        &request.plan,
        &request.voice,
        &request.render,
        &state.engine_config.encoder_binary,
        std::path::Path::new(&state.engine_config.work_dir),
        &providers_available,
    )
    .await;

    if !stage_has_a_provider(&tts_manifests, tier, offline_only) {
        validation
            .warnings
            .push("no voice provider available under the effective policy; narration will be silent".to_string());
    }
    if !stage_has_a_provider(&image_manifests, tier, offline_only) {
        validation
            .warnings
            .push("no image provider available under the effective policy; visuals will use placeholders".to_string());
    }

    if !validation.is_valid {
        let message = validation
            .issues
            .first()
            .map(|issue| format!("{}: {}", issue.field, issue.reason))
            .unwrap_or_else(|| "request failed validation".to_string());
        return Err(ApiError::Domain {
            code: aura_types::ErrorCode::InvalidInput,
            message,
        });
    }

    let job = Job::new(
        correlation_id.clone(),
        request.brief,
        request.plan,
        request.voice,
        request.render,
        system_profile,
        tier,
        offline_only,
    );

    let job_id = state.orchestrator.submit(job)?;
    metrics::record_job_submitted();
    info!(job_id = %job_id, correlation_id = %correlation_id.0, "job accepted");

    Ok(Json(SubmitJobResponse {
        job_id: job_id.to_string(),
        correlation_id: correlation_id.0,
        status: "Queued",
        percent: 0,
    }))
}

/// GET /jobs/:job_id — a snapshot of the job's public fields.
pub async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<Job>> {
    let job = state.orchestrator.store.get(&JobId::from_string(job_id)).await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub page_size: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<Job>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
}

/// GET /jobs — paginated snapshot, newest first.
pub async fn list_jobs(State(state): State<AppState>, Query(query): Query<ListJobsQuery>) -> Json<ListJobsResponse> {
    let mut jobs = state.orchestrator.store.list().await;
    jobs.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));

    let total = jobs.len();
    let page_size = query.page_size.unwrap_or(20).clamp(1, 200);
    let page = query.page.unwrap_or(0);
    let start = page.saturating_mul(page_size).min(total);
    let end = (start + page_size).min(total);

    Json(ListJobsResponse {
        jobs: jobs[start..end].to_vec(),
        page,
        page_size,
        total,
    })
}

/// POST /jobs/:job_id/cancel — idempotent; a terminal job is simply
/// returned as-is.
pub async fn cancel_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Json<Job>> {
    let job_id = JobId::from_string(job_id);
    state.orchestrator.store.cancel(&job_id).await?;
    let job = state.orchestrator.store.get(&job_id).await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    #[serde(default)]
    pub last_event_id: Option<String>,
}

/// GET /jobs/:job_id/events — the SSE stream ("Subscribe to
/// events"). Each `JobEvent` becomes one SSE frame with `id` set to the
/// event's own `event_id`, letting a browser `EventSource`'s automatic
/// `Last-Event-ID` reconnect header drive resume for free.
pub async fn subscribe_events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<SubscribeQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let job_id = JobId::from_string(job_id);
    // Touch the store so an unknown job id 404s before we open a stream,
    // rather than opening an SSE connection that never emits anything.
    state.orchestrator.store.get(&job_id).await?;

    let last_event_id = match query.last_event_id {
        Some(raw) => Some(
            raw.parse::<EventId>()
                .map_err(|e| ApiError::bad_request(format!("invalid last_event_id: {e}")))?,
        ),
        None => None,
    };

    metrics::set_active_sse_subscribers(1);
    let receiver = state.events.subscribe(&job_id, last_event_id);
    let stream = ReceiverStream::new(receiver).map(|event| {
        let kind = serde_json::to_value(&event.kind)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| "message".to_string());
        let payload = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().id(event.event_id.to_string()).event(kind).data(payload))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(10)).text("heartbeat")))
}

fn stage_has_a_provider(
    manifests: &[aura_types::CapabilityManifest],
    tier: RequestedTier,
    offline_only: bool,
) -> bool {
    select_chain(tier, offline_only, manifests).is_ok()
}

fn num_cpus_fallback() -> u32 {
    std::thread::available_parallelism().map(|n| n.get() as u32).unwrap_or(4)
}
