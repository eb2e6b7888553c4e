//! The eight-step pipeline orchestrator: the central routine that drives a
//! submitted job from `Queued` to a terminal state, one stage at a time,
//! applying each stage's own failure policy (hard-fail vs. degrade) along
//! the way.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use aura_jobstore::{JobMutation, JobStore};
use aura_process::{CleanupScope, ProcessSupervisor};
use aura_providers::error::ProviderError;
use aura_providers::registry::{manifests, ProviderRegistry};
use aura_providers::traits::{
    GeneratedImage, ImageProvider, LlmProvider, NarrationLine, ProgressSink, ScriptRequest,
    SynthesizedAudio, TtsProvider, VideoEncoderProvider,
};
use aura_resilience::{retry_with_backoff, CircuitBreaker, RetryResult};
use aura_types::{
    stage_weight, Artifact, ErrorCode, Failure, Job, JobId, JobStatus, Scene, SceneAsset, Stage,
    Timeline,
};
use aura_validate::output::{validate_audio, validate_image, validate_script};
use std::collections::HashMap;
use std::sync::Mutex as SyncMutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::selection::select_chain;

/// The heading prefix `RuleBasedLlmProvider` (and any other drafting
/// provider honoring the declared style) marks a scene with; the Script
/// output validator checks for its presence.
const SCENE_MARKER: &str = "## ";

/// Fallback soft timeout for a provider whose manifest somehow isn't present
/// in the lookup built from the same selection pass; should never trigger
/// in practice.
const DEFAULT_SOFT_TIMEOUT: Duration = Duration::from_secs(60);

/// The four provider registries a running engine holds, one per category.
/// Plain struct rather than a trait object map since the category set is
/// closed.
pub struct Providers {
    pub llm: ProviderRegistry<dyn LlmProvider>,
    pub tts: ProviderRegistry<dyn TtsProvider>,
    pub image: ProviderRegistry<dyn ImageProvider>,
    pub encoder: ProviderRegistry<dyn VideoEncoderProvider>,
}

/// Orchestrates every submitted job. One instance per running engine,
/// shared (via `Arc`) between the API surface that submits jobs and the
/// background tasks that run them.
pub struct Orchestrator {
    pub store: Arc<JobStore>,
    providers: Arc<Providers>,
    supervisor: ProcessSupervisor,
    config: EngineConfig,
    job_semaphore: Arc<Semaphore>,
    /// One breaker per `(stage, provider_name)`, created lazily on first use.
    breakers: SyncMutex<HashMap<(Stage, String), CircuitBreaker>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<JobStore>,
        providers: Arc<Providers>,
        supervisor: ProcessSupervisor,
        config: EngineConfig,
    ) -> Arc<Self> {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Arc::new(Self {
            store,
            providers,
            supervisor,
            config,
            job_semaphore,
            breakers: SyncMutex::new(HashMap::new()),
        })
    }

    /// Fetch (creating on first use) the breaker guarding a given stage's
    /// provider. Each chain attempt consults `allow()` before calling in and
    /// reports `success()`/`failure()` back once the attempt resolves.
    fn breaker_for(&self, stage: Stage, name: &str) -> CircuitBreaker {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry((stage, name.to_string()))
            .or_insert_with(|| {
                CircuitBreaker::new(
                    self.config.circuit_failure_threshold,
                    self.config.circuit_recovery_timeout,
                    self.config.circuit_success_threshold,
                )
            })
            .clone()
    }

    /// Accept a job into the store and spawn its pipeline run in the
    /// background. Mirrors `JobExecutor`'s claim-then-spawn shape, minus
    /// the queue: the store's `submit` is itself the claim.
    pub fn submit(self: &Arc<Self>, job: Job) -> Result<JobId, aura_jobstore::StoreError> {
        let job_id = self.store.submit(job)?;
        let this = Arc::clone(self);
        let spawned_id = job_id.clone();
        tokio::spawn(async move {
            this.run_job(spawned_id).await;
        });
        Ok(job_id)
    }

    /// Drive one job through every stage, applying the per-stage failure
    /// policy, and land it in a terminal state. Never panics out of this
    /// function: every fallible step is handled and converted into either
    /// continuation, a warning, or a job failure.
    async fn run_job(&self, job_id: JobId) {
        // Bound total concurrently-running pipelines (
        // `max_concurrent_jobs`). A job waiting on this permit is still
        // cancellable: `cancel(job_id)` on a Queued job transitions it to
        // Canceled without this task ever acquiring the semaphore.
        let _permit = match self.job_semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let job = match self.store.get(&job_id).await {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "job vanished before it could run");
                return;
            }
        };
        if job.status.is_terminal() {
            return;
        }

        let cancel = match self.store.cancellation_token(&job_id) {
            Ok(token) => token,
            Err(_) => return,
        };

        if self.store.update(&job_id, JobMutation::Start).await.is_err() {
            return;
        }

        let cleanup = CleanupScope::new(format!("job-{job_id}"));
        let outcome = self.run_stages(&job, &job_id, &cancel, &cleanup).await;
        cleanup.close().await;

        match outcome {
            Ok(artifact) => {
                let _ = self.store.update(&job_id, JobMutation::AddArtifact(artifact)).await;
                let _ = self.store.update(&job_id, JobMutation::Complete).await;
            }
            Err(failure) if cancel.is_cancelled() => {
                info!(job_id = %job_id, "job canceled mid-pipeline");
                let _ = failure; // a cancellation races an in-flight stage error; the cancel itself already landed via JobStore::cancel.
            }
            Err(failure) => {
                warn!(job_id = %job_id, stage = %failure.stage, code = %failure.error_code, "job failed");
                let _ = self.store.update(&job_id, JobMutation::Fail(failure)).await;
            }
        }
    }

    async fn run_stages(
        &self,
        job: &Job,
        job_id: &JobId,
        cancel: &CancellationToken,
        cleanup: &CleanupScope,
    ) -> Result<Artifact, Failure> {
        if cancel.is_cancelled() {
            return Err(cancellation_failure(Stage::Initialization));
        }

        let drafted = self.run_script_stage(job, job_id, cancel).await?;
        let narration = self.run_voice_stage(job, job_id, cancel, cleanup, &drafted.scenes).await?;
        let visuals = self.run_visuals_stage(job, job_id, cancel, cleanup, &drafted.scenes).await?;
        let timeline = self.run_compose_stage(job, &drafted.scenes, &visuals, narration.as_ref());
        let rendered_path = self.run_render_stage(job, job_id, cancel, &timeline).await?;
        self.run_postprocess_stage(job_id, cleanup, &rendered_path).await
    }

    /// Step 2: Script. Chain-exhausted or non-retryable failure fails the
    /// job.
    async fn run_script_stage(
        &self,
        job: &Job,
        job_id: &JobId,
        cancel: &CancellationToken,
    ) -> Result<aura_providers::traits::DraftedScript, Failure> {
        self.enter_stage(job_id, Stage::Script).await;

        let available = manifests(&self.providers.llm, |p| p.manifest().clone());
        let record = select_chain(job.requested_tier, job.offline_only, &available)
            .map_err(|e| provider_error_to_failure(Stage::Script, e))?;

        let request = ScriptRequest {
            topic: job.brief.topic.clone(),
            audience: job.brief.audience.clone(),
            goal: job.brief.goal.clone(),
            tone: job.brief.tone.clone(),
            language: job.brief.language.clone(),
            style: job.plan.style.clone(),
            target_duration_secs: job.plan.duration_secs,
        };

        let retry_config = self.config.retry_config_for(Stage::Script, "script.draft");
        let chain = self.chain_names(&record);
        let timeouts = soft_timeouts(&available);

        let mut last_err = None;
        for name in &chain {
            let Some(provider) = self.providers.llm.get(name) else { continue };
            let breaker = self.breaker_for(Stage::Script, name);
            if !breaker.allow() {
                last_err = Some(ProviderError::new(ErrorCode::GenericProviderFailure, name.to_string(), "circuit open"));
                continue;
            }
            let timeout = timeouts.get(name).copied().unwrap_or(DEFAULT_SOFT_TIMEOUT);
            let attempt = || async {
                let drafted = with_soft_timeout(timeout, name, provider.draft_script(&request)).await?;
                validate_script(&drafted.full_text, SCENE_MARKER)
                    .map_err(|e| e.into_provider_error(name))?;
                Ok(drafted)
            };
            match retry_with_backoff(&retry_config, cancel, attempt).await {
                RetryResult::Success(drafted) => {
                    breaker.success();
                    self.record_provider(job_id, Stage::Script, name).await;
                    self.publish_stage_progress(job_id, Stage::Script, 100).await;
                    return Ok(drafted);
                }
                RetryResult::Canceled => return Err(cancellation_failure(Stage::Script)),
                RetryResult::Failed { error, .. } => {
                    breaker.failure();
                    last_err = Some(error);
                }
            }
        }

        Err(provider_error_to_failure(
            Stage::Script,
            last_err.unwrap_or_else(|| {
                ProviderError::new(ErrorCode::NoProviderAvailable, "script", "provider chain exhausted")
            }),
        ))
    }

    /// Step 3: Voice. Stage failure degrades to a warning and a `None`
    /// narration track, unless the brief sets `require_narration`, in which
    /// case chain exhaustion fails the job instead of producing a silent
    /// render.
    async fn run_voice_stage(
        &self,
        job: &Job,
        job_id: &JobId,
        cancel: &CancellationToken,
        cleanup: &CleanupScope,
        scenes: &[aura_providers::traits::ScriptScene],
    ) -> Result<Option<SynthesizedAudio>, Failure> {
        self.enter_stage(job_id, Stage::Voice).await;

        let lines: Vec<NarrationLine> = scenes
            .iter()
            .enumerate()
            .map(|(i, s)| NarrationLine {
                text: s.narration_line.clone(),
                scene_index: i as u32,
            })
            .collect();

        let available = manifests(&self.providers.tts, |p| p.manifest().clone());
        let record = match select_chain(job.requested_tier, job.offline_only, &available) {
            Ok(record) => record,
            Err(e) => return self.degrade_or_fail_voice(job, job_id, e).await,
        };

        let retry_config = self.config.retry_config_for(Stage::Voice, "voice.synthesize");
        let chain = self.chain_names(&record);
        let timeouts = soft_timeouts(&available);

        let mut last_err = None;
        for name in &chain {
            let Some(provider) = self.providers.tts.get(name) else { continue };
            let breaker = self.breaker_for(Stage::Voice, name);
            if !breaker.allow() {
                last_err = Some(ProviderError::new(ErrorCode::GenericProviderFailure, name.to_string(), "circuit open"));
                continue;
            }
            let timeout = timeouts.get(name).copied().unwrap_or(DEFAULT_SOFT_TIMEOUT);
            let attempt = || async {
                let audio = with_soft_timeout(timeout, name, provider.synthesize(&lines, job.voice.rate, job.voice.pitch)).await?;
                validate_audio(&audio.path).await.map_err(|e| e.into_provider_error(name))?;
                Ok(audio)
            };
            match retry_with_backoff(&retry_config, cancel, attempt).await {
                RetryResult::Success(audio) => {
                    breaker.success();
                    cleanup.register_temp(&audio.path);
                    self.record_provider(job_id, Stage::Voice, name).await;
                    self.publish_stage_progress(job_id, Stage::Voice, 100).await;
                    return Ok(Some(audio));
                }
                RetryResult::Canceled => return Err(cancellation_failure(Stage::Voice)),
                RetryResult::Failed { error, .. } => {
                    breaker.failure();
                    last_err = Some(error);
                }
            }
        }

        let reason = last_err
            .unwrap_or_else(|| ProviderError::new(ErrorCode::NoProviderAvailable, "voice", "provider chain exhausted"));
        self.degrade_or_fail_voice(job, job_id, reason).await
    }

    /// Shared tail of `run_voice_stage`'s two failure paths (no chain
    /// selectable at all, or the chain selected but exhausted by retries).
    async fn degrade_or_fail_voice(
        &self,
        job: &Job,
        job_id: &JobId,
        reason: ProviderError,
    ) -> Result<Option<SynthesizedAudio>, Failure> {
        if job.brief.require_narration {
            warn!(job_id = %job_id, "narration required by brief but unavailable, failing the job");
            return Err(provider_error_to_failure(Stage::Voice, reason));
        }
        let message = format!("voice stage degraded to silent narration: {reason}");
        let _ = self.store.update(job_id, JobMutation::AddWarning(message)).await;
        self.publish_stage_progress(job_id, Stage::Voice, 100).await;
        Ok(None)
    }

    /// Step 4: Visuals. Bounded-concurrency workgroup
    /// (`Semaphore::new(min(4, cores))`) so image generation can't
    /// oversubscribe the machine. A scene with no eligible image provider
    /// gets a placeholder and a warning rather than failing the stage.
    async fn run_visuals_stage(
        &self,
        job: &Job,
        job_id: &JobId,
        cancel: &CancellationToken,
        cleanup: &CleanupScope,
        scenes: &[aura_providers::traits::ScriptScene],
    ) -> Result<Vec<Option<GeneratedImage>>, Failure> {
        self.enter_stage(job_id, Stage::Visuals).await;

        let available = manifests(&self.providers.image, |p| p.manifest().clone());
        let record = select_chain(job.requested_tier, job.offline_only, &available).ok();
        let retry_config = self.config.retry_config_for(Stage::Visuals, "visuals.generate");
        let timeouts = soft_timeouts(&available);
        let total_items = scenes.len() as u32;
        let concurrency = (job.system_profile.logical_cores as usize).min(4).max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));

        // Breakers for every provider in the chain are resolved once up
        // front (cheap clones of the `Arc<RwLock<..>>` inside each one) so
        // the spawned per-scene tasks don't need a handle back to `self`.
        let breakers: HashMap<String, CircuitBreaker> = record
            .as_ref()
            .map(|r| {
                r.chain
                    .iter()
                    .map(|name| (name.clone(), self.breaker_for(Stage::Visuals, name)))
                    .collect()
            })
            .unwrap_or_default();

        let mut handles = Vec::with_capacity(scenes.len());
        for (index, scene) in scenes.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(cancellation_failure(Stage::Visuals));
            }
            let semaphore = semaphore.clone();
            let record = record.clone();
            let retry_config = retry_config.clone();
            let cancel = cancel.clone();
            let providers = Arc::clone(&self.providers);
            let breakers = breakers.clone();
            let timeouts = timeouts.clone();
            let heading = scene.heading.clone();
            let narration = scene.narration_line.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let Some(record) = record else {
                    return (index as u32, None, Some("no image provider available".to_string()));
                };
                let chain: &[String] = &record.chain;
                let mut last_err = None;
                for name in chain {
                    let Some(provider) = providers.image.get(name) else { continue };
                    let Some(breaker) = breakers.get(name) else { continue };
                    if !breaker.allow() {
                        last_err = Some(ProviderError::new(ErrorCode::GenericProviderFailure, name.to_string(), "circuit open"));
                        continue;
                    }
                    let timeout = timeouts.get(name).copied().unwrap_or(DEFAULT_SOFT_TIMEOUT);
                    let attempt = || async {
                        let image = with_soft_timeout(timeout, name, provider.generate_scene_image(&heading, &narration)).await?;
                        validate_image(&image.path).await.map_err(|e| e.into_provider_error(name))?;
                        Ok(image)
                    };
                    match retry_with_backoff(&retry_config, &cancel, attempt).await {
                        RetryResult::Success(image) => {
                            breaker.success();
                            return (index as u32, Some((name.clone(), image)), None);
                        }
                        RetryResult::Canceled => return (index as u32, None, Some("canceled".to_string())),
                        RetryResult::Failed { error, .. } => {
                            breaker.failure();
                            last_err = Some(error);
                        }
                    }
                }
                let reason = last_err.map(|e| e.to_string()).unwrap_or_else(|| "chain exhausted".to_string());
                (index as u32, None, Some(reason))
            }));
        }

        let mut results: Vec<Option<(Option<String>, GeneratedImage)>> = vec![None; scenes.len()];
        let mut completed = 0u32;
        for handle in handles {
            let (index, outcome, warning) = handle.await.map_err(|e| Failure {
                stage: Stage::Visuals,
                error_code: ErrorCode::GenericProviderFailure,
                message: format!("visuals task panicked: {e}"),
                stderr_snippet: None,
                log_path: None,
                suggested_actions: vec![],
            })?;

            match outcome {
                Some((provider_name, image)) => {
                    cleanup.register_temp(&image.path);
                    if let Some(name) = provider_name {
                        self.record_provider(job_id, Stage::Visuals, &name).await;
                    }
                    results[index as usize] = Some((None, image));
                }
                None => {
                    let message = warning.unwrap_or_else(|| "image generation failed".to_string());
                    let _ = self
                        .store
                        .update(job_id, JobMutation::AddWarning(format!("scene {index}: {message}, using placeholder")))
                        .await;
                }
            }

            completed += 1;
            let stage_pct = ((completed as f64 / total_items.max(1) as f64) * 100.0) as u8;
            self.publish_visuals_progress(job_id, stage_pct, completed, total_items).await;
        }

        Ok(results.into_iter().map(|r| r.map(|(_, image)| image)).collect())
    }

    /// Step 5: Compose. Pure data transformation: builds an immutable
    /// `Timeline`, deterministic by scene index, snapped to the render
    /// spec's fps. Scenes with no generated asset get a placeholder
    /// marker (`is_placeholder: true`) rather than an absent asset list.
    fn run_compose_stage(
        &self,
        job: &Job,
        scenes: &[aura_providers::traits::ScriptScene],
        visuals: &[Option<GeneratedImage>],
        narration: Option<&SynthesizedAudio>,
    ) -> Timeline {
        let per_scene_secs = (job.plan.duration_secs as f64 / scenes.len().max(1) as f64).max(0.1);
        let mut cursor = 0.0;
        let mut built_scenes = Vec::with_capacity(scenes.len());

        for (index, scene) in scenes.iter().enumerate() {
            let asset = match visuals.get(index).and_then(|v| v.as_ref()) {
                Some(image) => SceneAsset {
                    path: image.path.clone(),
                    is_placeholder: false,
                },
                None => SceneAsset {
                    path: String::new(),
                    is_placeholder: true,
                },
            };

            let narration_path = narration.map(|audio| audio.path.clone());

            built_scenes.push(Scene {
                index: index as u32,
                heading: scene.heading.clone(),
                start_secs: cursor,
                duration_secs: per_scene_secs,
                assets: vec![asset],
                narration_path,
                subtitle_text: Some(scene.narration_line.clone()),
            });
            cursor += per_scene_secs;
        }

        Timeline {
            scenes: built_scenes,
            fps: job.render.fps,
        }
    }

    /// Step 6: Render. Delegates to the encoder provider, which
    /// goes through the process supervisor for the subprocess.
    /// Render progress is propagated into the job via monotonic writes.
    async fn run_render_stage(
        &self,
        job: &Job,
        job_id: &JobId,
        cancel: &CancellationToken,
        timeline: &Timeline,
    ) -> Result<String, Failure> {
        self.enter_stage(job_id, Stage::Render).await;

        let available = manifests(&self.providers.encoder, |p| p.manifest().clone());
        let record = select_chain(job.requested_tier, job.offline_only, &available)
            .map_err(|e| provider_error_to_failure(Stage::Render, e))?;
        let retry_config = self.config.retry_config_for(Stage::Render, "render.encode");
        let chain = self.chain_names(&record);
        let timeouts = soft_timeouts(&available);

        let mut last_err = None;
        for name in &chain {
            let Some(provider) = self.providers.encoder.get(name) else { continue };
            let breaker = self.breaker_for(Stage::Render, name);
            if !breaker.allow() {
                last_err = Some(ProviderError::new(ErrorCode::GenericProviderFailure, name.to_string(), "circuit open"));
                continue;
            }
            let timeout = timeouts.get(name).copied().unwrap_or(DEFAULT_SOFT_TIMEOUT);
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let progress_job_id = job_id.clone();
            let store = Arc::clone(&self.store);
            let forward = tokio::spawn(async move {
                while let Some(update) = rx.recv().await {
                    let overall = overall_percent(Stage::Render, update.percentage);
                    let _ = store.with_monotonic_progress(&progress_job_id, overall).await;
                }
            });

            let attempt = || {
                let progress: ProgressSink = tx.clone();
                with_soft_timeout(timeout, name, async { provider.render(timeline, &job.render, progress, cancel.clone()).await })
            };
            let result = retry_with_backoff(&retry_config, cancel, attempt).await;
            drop(tx);
            let _ = forward.await;

            match result {
                RetryResult::Success(path) => {
                    breaker.success();
                    self.record_provider(job_id, Stage::Render, name).await;
                    return Ok(path);
                }
                RetryResult::Canceled => return Err(cancellation_failure(Stage::Render)),
                RetryResult::Failed { error, .. } => {
                    breaker.failure();
                    last_err = Some(error);
                }
            }
        }

        Err(provider_error_to_failure(
            Stage::Render,
            last_err.unwrap_or_else(|| {
                ProviderError::new(ErrorCode::NoProviderAvailable, "render", "provider chain exhausted")
            }),
        ))
    }

    /// Step 7: Postprocess. Moves the encoder output out of the cleanup
    /// scope (it's a durable artifact now, not scratch) and records its
    /// size.
    async fn run_postprocess_stage(
        &self,
        job_id: &JobId,
        cleanup: &CleanupScope,
        rendered_path: &str,
    ) -> Result<Artifact, Failure> {
        self.enter_stage(job_id, Stage::Postprocess).await;

        let path = PathBuf::from(rendered_path);
        cleanup.transfer_out(&path);

        let size_bytes = tokio::fs::metadata(&path)
            .await
            .map(|m| m.len())
            .map_err(|e| Failure {
                stage: Stage::Postprocess,
                error_code: ErrorCode::EncoderRuntime,
                message: format!("rendered artifact missing or unreadable: {e}"),
                stderr_snippet: None,
                log_path: None,
                suggested_actions: vec!["verify the encoder actually wrote its output file".to_string()],
            })?;

        self.publish_stage_progress(job_id, Stage::Postprocess, 100).await;

        Ok(Artifact {
            path: rendered_path.to_string(),
            size_bytes,
            kind: "video".to_string(),
        })
    }

    fn chain_names(&self, record: &crate::selection::SelectionRecord) -> Vec<String> {
        if self.config.auto_fallback {
            record.chain.clone()
        } else {
            vec![record.primary.clone()]
        }
    }

    async fn enter_stage(&self, job_id: &JobId, stage: Stage) {
        let _ = self.store.update(job_id, JobMutation::EnterStage(stage)).await;
    }

    async fn record_provider(&self, job_id: &JobId, stage: Stage, name: &str) {
        let _ = self
            .store
            .update(job_id, JobMutation::RecordProviderUsed(stage, name.to_string()))
            .await;
    }

    async fn publish_stage_progress(&self, job_id: &JobId, stage: Stage, stage_pct: u8) {
        let overall = overall_percent(stage, stage_pct);
        let _ = self.store.with_monotonic_progress(job_id, overall).await;
    }

    async fn publish_visuals_progress(&self, job_id: &JobId, stage_pct: u8, current_item: u32, total_items: u32) {
        let overall = overall_percent(Stage::Visuals, stage_pct);
        let _ = self.store.with_monotonic_progress(job_id, overall).await;
        let _ = (current_item, total_items); // carried in the event payload by JobStore::publish_diff today; kept as parameters for a future per-item event hook.
    }
}

/// `overall = base + stage_percent/100 * weight`, using each stage's fixed
/// weight, the single formula every per-stage progress write goes through
/// before `JobStore::with_monotonic_progress`.
fn overall_percent(stage: Stage, stage_percent: u8) -> u8 {
    let (base, weight) = stage_weight(stage);
    let scaled = (weight as u32 * stage_percent.min(100) as u32) / 100;
    (base as u32 + scaled).min(100) as u8
}

/// Race a single provider call against its manifest's soft timeout. An
/// elapsed timeout becomes a retryable `ErrorCode::Timeout`, so it flows
/// through the same retry/circuit-breaker path as any other provider
/// failure rather than needing a path of its own.
async fn with_soft_timeout<T, Fut>(duration: Duration, provider_name: &str, call: Fut) -> Result<T, ProviderError>
where
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(duration, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::new(
            ErrorCode::Timeout,
            provider_name.to_string(),
            format!("soft timeout of {duration:?} elapsed"),
        )),
    }
}

fn soft_timeouts(manifests: &[aura_types::CapabilityManifest]) -> HashMap<String, Duration> {
    manifests.iter().map(|m| (m.name.clone(), m.soft_timeout)).collect()
}

fn provider_error_to_failure(stage: Stage, error: ProviderError) -> Failure {
    Failure {
        stage,
        error_code: error.kind,
        message: error.message,
        stderr_snippet: None,
        log_path: None,
        suggested_actions: vec![],
    }
}

fn cancellation_failure(stage: Stage) -> Failure {
    Failure {
        stage,
        error_code: ErrorCode::Timeout,
        message: "canceled".to_string(),
        stderr_snippet: None,
        log_path: None,
        suggested_actions: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_jobstore::EventBus;
    use aura_providers::reference::{
        MockVideoEncoderProvider, NullTtsProvider, PlaceholderImageProvider, RuleBasedLlmProvider,
    };
    use aura_resilience::CircuitState;
    use aura_providers::registry::ProviderRegistryBuilder;
    use aura_types::{
        Aspect, Brief, Container, CorrelationId, Density, Pacing, PauseStyle, PlanSpec, RenderSpec,
        RequestedTier, SystemProfile, VideoCodec, VoiceSpec,
    };

    fn providers() -> Arc<Providers> {
        Arc::new(Providers {
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
                .register("mock", Arc::new(MockVideoEncoderProvider::new().with_ticks(2)))
                .build(),
        })
    }

    fn sample_job() -> Job {
        Job::new(
            CorrelationId::new(),
            Brief {
                topic: "Rust".into(),
                audience: "engineers".into(),
                goal: "teach".into(),
                tone: "friendly".into(),
                language: "English".into(),
                aspect: Aspect::Widescreen16x9,
                require_narration: false,
            },
            PlanSpec {
                duration_secs: 20,
                pacing: Pacing::Fast,
                density: Density::Sparse,
                style: "explainer".into(),
            },
            VoiceSpec {
                voice_name: "Default".into(),
                rate: 1.0,
                pitch: 1.0,
                pause_style: PauseStyle::Natural,
            },
            RenderSpec {
                width: 640,
                height: 360,
                container: Container::Mp4,
                video_codec: VideoCodec::H264,
                fps: 24,
                video_kbps: 1500,
                audio_kbps: 96,
                quality: 60,
                enable_scene_cut: false,
            },
            SystemProfile {
                logical_cores: 4,
                physical_cores: 2,
                ram_gib: 8,
                gpu: None,
            },
            RequestedTier::Free,
            true,
        )
    }

    fn orchestrator() -> Arc<Orchestrator> {
        let store = Arc::new(JobStore::new(Arc::new(EventBus::new(1024, Duration::from_secs(10)))));
        Orchestrator::new(store, providers(), ProcessSupervisor::new(), EngineConfig::default())
    }

    #[tokio::test]
    async fn a_free_tier_offline_job_runs_end_to_end_on_reference_providers() {
        let orchestrator = orchestrator();
        let job_id = orchestrator.submit(sample_job()).unwrap();

        let mut job = orchestrator.store.get(&job_id).await.unwrap();
        for _ in 0..200 {
            if job.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            job = orchestrator.store.get(&job_id).await.unwrap();
        }

        assert_eq!(job.status, JobStatus::Done, "job did not complete: {:?}", job.failure);
        assert_eq!(job.percent, 100);
        assert_eq!(job.artifacts.len(), 1);
        assert_eq!(job.artifacts[0].kind, "video");
    }

    #[tokio::test]
    async fn overall_percent_matches_the_stage_weight_table() {
        assert_eq!(overall_percent(Stage::Script, 0), 0);
        assert_eq!(overall_percent(Stage::Script, 100), 25);
        assert_eq!(overall_percent(Stage::Voice, 100), 55);
        assert_eq!(overall_percent(Stage::Render, 0), 80);
        assert_eq!(overall_percent(Stage::Render, 100), 95);
        assert_eq!(overall_percent(Stage::Postprocess, 100), 100);
    }

    #[tokio::test]
    async fn required_narration_with_no_tts_provider_fails_the_job_instead_of_degrading() {
        let store = Arc::new(JobStore::new(Arc::new(EventBus::new(1024, Duration::from_secs(10)))));
        let providers = Arc::new(Providers {
            llm: ProviderRegistryBuilder::new()
                .register("rule-based", Arc::new(RuleBasedLlmProvider::new()))
                .build(),
            tts: ProviderRegistryBuilder::new().build(),
            image: ProviderRegistryBuilder::new()
                .register("placeholder", Arc::new(PlaceholderImageProvider::new()))
                .build(),
            encoder: ProviderRegistryBuilder::new()
                .register("mock", Arc::new(MockVideoEncoderProvider::new().with_ticks(2)))
                .build(),
        });
        let orchestrator = Orchestrator::new(store, providers, ProcessSupervisor::new(), EngineConfig::default());

        let mut job = sample_job();
        job.brief.require_narration = true;
        let job_id = orchestrator.submit(job).unwrap();

        let mut job = orchestrator.store.get(&job_id).await.unwrap();
        for _ in 0..200 {
            if job.status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            job = orchestrator.store.get(&job_id).await.unwrap();
        }

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure.as_ref().map(|f| f.stage), Some(Stage::Voice));
    }

    #[tokio::test]
    async fn cancelling_before_any_stage_starts_leaves_the_job_canceled() {
        let orchestrator = orchestrator();
        let job_id = orchestrator.store.submit(sample_job()).unwrap();
        orchestrator.store.cancel(&job_id).await.unwrap();

        orchestrator.run_job(job_id.clone()).await;

        let job = orchestrator.store.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Canceled);
    }

    #[test]
    fn breaker_for_returns_the_same_breaker_for_the_same_key() {
        let store = Arc::new(JobStore::new(Arc::new(EventBus::new(1024, Duration::from_secs(10)))));
        let orchestrator = Orchestrator::new(store, providers(), ProcessSupervisor::new(), EngineConfig::default());

        let first = orchestrator.breaker_for(Stage::Render, "mock");
        for _ in 0..orchestrator.config.circuit_failure_threshold {
            first.failure();
        }
        let second = orchestrator.breaker_for(Stage::Render, "mock");
        assert!(matches!(second.state(), CircuitState::Open { .. }));

        let other = orchestrator.breaker_for(Stage::Render, "other-provider");
        assert_eq!(other.state(), CircuitState::Closed);
    }
}
