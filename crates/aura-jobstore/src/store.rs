//! In-memory, per-job-locked `JobStore` and the state machine that guards
//! every write against it. Every mutation passes through a single
//! transition check so an illegal status change is rejected instead of
//! silently applied.

use std::collections::HashMap;
use std::sync::Arc;

use aura_types::{Artifact, CorrelationId, Failure, Job, JobId, JobStatus, Stage};
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::events::EventBus;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job {0} is already in a terminal state ({1})")]
    AlreadyTerminal(JobId, JobStatus),
    #[error("illegal transition for job {job_id}: {from} -> {attempted}")]
    IllegalTransition {
        job_id: JobId,
        from: JobStatus,
        attempted: JobStatus,
    },
}

/// A single blessed mutation `update` will apply under the per-job lock.
/// Keeping this a closed set (rather than an arbitrary `FnMut(&mut Job)`)
/// is what lets `update` validate every mutation against the state
/// machine and the monotonic-progress invariant in one place.
#[derive(Debug, Clone)]
pub enum JobMutation {
    /// Queued -> Running. Sets `started_utc`.
    Start,
    /// Enter a new stage; its stage-weight base becomes the progress floor.
    EnterStage(Stage),
    /// `percent = max(current, clamp(target, 0, 100))`.
    SetPercent(u8),
    /// Record the provider used for a stage, first-success-wins.
    RecordProviderUsed(Stage, String),
    AddWarning(String),
    AddArtifact(Artifact),
    /// Running -> Done.
    Complete,
    /// Running -> Failed.
    Fail(Failure),
    /// Queued|Running -> Canceled.
    Cancel,
}

/// What actually changed as a result of applying a `JobMutation`, used by
/// the caller to decide which `JobEvent`s to publish through the event bus.
#[derive(Debug, Clone, Default)]
pub struct JobDiff {
    pub status_changed: bool,
    pub stage_changed: bool,
    /// Overall percent delta; `step-progress` is suppressed for deltas < 1
    /// unless the stage also changed.
    pub percent_delta: i16,
    pub became_terminal: Option<JobStatus>,
    pub warning_added: Option<String>,
}

impl JobDiff {
    fn any(&self) -> bool {
        self.status_changed
            || self.stage_changed
            || self.percent_delta != 0
            || self.became_terminal.is_some()
            || self.warning_added.is_some()
    }
}

struct JobCell {
    job: AsyncMutex<Job>,
    cancel: CancellationToken,
}

/// In-memory `job_id -> Job` map, serialized per job: each job gets its own
/// lock, so a long-running mutation on one job never blocks reads or writes
/// on another.
pub struct JobStore {
    jobs: std::sync::Mutex<HashMap<JobId, Arc<JobCell>>>,
    events: Arc<EventBus>,
    draining: std::sync::atomic::AtomicBool,
}

impl JobStore {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            jobs: std::sync::Mutex::new(HashMap::new()),
            events,
            draining: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Reject new submissions, as the first step of shutdown. Existing jobs are
    /// unaffected; this only gates `submit`.
    pub fn begin_draining(&self) {
        self.draining.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Accept a freshly-constructed `Job` (already `Queued`), publishing an
    /// initial `job-status` event so subscribers see the queued state even
    /// if they connect before the orchestrator picks the job up.
    pub fn submit(&self, job: Job) -> Result<JobId, StoreError> {
        let job_id = job.id.clone();
        let correlation_id = job.correlation_id.clone();
        let cell = Arc::new(JobCell {
            job: AsyncMutex::new(job),
            cancel: CancellationToken::new(),
        });
        self.jobs.lock().unwrap().insert(job_id.clone(), cell);
        self.events
            .publish_status(&job_id, JobStatus::Queued, Stage::Initialization, 0, correlation_id);
        Ok(job_id)
    }

    /// Cancellation token derived for this job's pipeline run; cloned by
    /// the orchestrator at job start and propagated into per-stage tokens.
    pub fn cancellation_token(&self, job_id: &JobId) -> Result<CancellationToken, StoreError> {
        self.cell(job_id).map(|cell| cell.cancel.clone())
    }

    fn cell(&self, job_id: &JobId) -> Result<Arc<JobCell>, StoreError> {
        self.jobs
            .lock()
            .unwrap()
            .get(job_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(job_id.clone()))
    }

    /// Lock-free-for-the-caller snapshot of a single job.
    pub async fn get(&self, job_id: &JobId) -> Result<Job, StoreError> {
        let cell = self.cell(job_id)?;
        Ok(cell.job.lock().await.clone())
    }

    /// Snapshot of every job, most-recently-created first.
    pub async fn list(&self) -> Vec<Job> {
        let cells: Vec<Arc<JobCell>> = self.jobs.lock().unwrap().values().cloned().collect();
        let mut jobs = Vec::with_capacity(cells.len());
        for cell in cells {
            jobs.push(cell.job.lock().await.clone());
        }
        jobs.sort_by(|a, b| b.created_utc.cmp(&a.created_utc));
        jobs
    }

    /// Apply a mutation under the job's lock, validating it against the
    /// state machine and the monotonic-progress invariant, then publish
    /// the resulting diff as events through the event bus.
    pub async fn update(&self, job_id: &JobId, mutation: JobMutation) -> Result<JobDiff, StoreError> {
        let cell = self.cell(job_id)?;
        let mut job = cell.job.lock().await;

        if job.status.is_terminal() {
            // Terminal jobs accept no further updates other than `ended_utc`
            // bookkeeping, which happens as part of the transition itself.
            return Err(StoreError::AlreadyTerminal(job_id.clone(), job.status));
        }

        let mut diff = JobDiff::default();
        apply_mutation(&mut job, &mutation, &mut diff)?;

        if diff.became_terminal.is_some() {
            job.ended_utc = Some(Utc::now());
        }

        if diff.any() {
            self.publish_diff(&job, &diff);
        }

        Ok(diff)
    }

    /// `percent = max(current, clamp(target, 0, 100))`. Exposed directly
    /// since the orchestrator calls this far more often than any other
    /// mutation (every stage progress tick).
    pub async fn with_monotonic_progress(&self, job_id: &JobId, target: u8) -> Result<JobDiff, StoreError> {
        self.update(job_id, JobMutation::SetPercent(target)).await
    }

    /// Idempotent cancel: no-op if the job is already terminal.
    pub async fn cancel(&self, job_id: &JobId) -> Result<JobDiff, StoreError> {
        let cell = self.cell(job_id)?;
        {
            let job = cell.job.lock().await;
            if job.status.is_terminal() {
                return Ok(JobDiff::default());
            }
        }
        cell.cancel.cancel();
        self.update(job_id, JobMutation::Cancel).await
    }

    fn publish_diff(&self, job: &Job, diff: &JobDiff) {
        if diff.status_changed {
            self.events
                .publish_status(&job.id, job.status, job.stage, job.percent, job.correlation_id.clone());
        }
        if diff.stage_changed {
            self.events
                .publish_stage(&job.id, job.stage, job.percent, job.correlation_id.clone());
        }
        // Percent changes are suppressed below a 1% delta unless the stage
        // also changed in the same mutation.
        if diff.percent_delta.unsigned_abs() >= 1 || diff.stage_changed {
            self.events
                .publish_progress(&job.id, job.stage, job.percent, job.correlation_id.clone(), None, None, None);
        }
        if let Some(message) = &diff.warning_added {
            self.events
                .publish_warning(&job.id, job.stage, job.percent, job.correlation_id.clone(), message.clone());
        }
        if let Some(terminal) = diff.became_terminal {
            self.events.publish_terminal(job, terminal);
        }
    }
}

fn apply_mutation(job: &mut Job, mutation: &JobMutation, diff: &mut JobDiff) -> Result<(), StoreError> {
    match mutation {
        JobMutation::Start => {
            require_transition(job, JobStatus::Queued, JobStatus::Running)?;
            job.status = JobStatus::Running;
            job.started_utc = Some(Utc::now());
            diff.status_changed = true;
        }
        JobMutation::EnterStage(stage) => {
            if job.stage != *stage {
                job.stage = *stage;
                let (base, _weight) = aura_types::stage_weight(*stage);
                let before = job.percent;
                job.percent = job.percent.max(base);
                diff.percent_delta += job.percent as i16 - before as i16;
                diff.stage_changed = true;
            }
        }
        JobMutation::SetPercent(target) => {
            let clamped = (*target).min(100);
            let before = job.percent;
            job.percent = job.percent.max(clamped);
            diff.percent_delta += job.percent as i16 - before as i16;
        }
        JobMutation::RecordProviderUsed(stage, provider) => {
            // First-success-wins: a later fallback inside the same stage
            // does not overwrite the first provider recorded for it.
            job.provider_used_per_stage.entry(*stage).or_insert_with(|| provider.clone());
        }
        JobMutation::AddWarning(message) => {
            job.warnings.push(message.clone());
            diff.warning_added = Some(message.clone());
        }
        JobMutation::AddArtifact(artifact) => {
            job.artifacts.push(artifact.clone());
        }
        JobMutation::Complete => {
            require_transition(job, JobStatus::Running, JobStatus::Done)?;
            job.status = JobStatus::Done;
            job.stage = Stage::Complete;
            job.completed_utc = Some(Utc::now());
            let before = job.percent;
            job.percent = 100;
            diff.percent_delta += job.percent as i16 - before as i16;
            diff.status_changed = true;
            diff.became_terminal = Some(JobStatus::Done);
        }
        JobMutation::Fail(failure) => {
            require_transition(job, JobStatus::Running, JobStatus::Failed)?;
            job.status = JobStatus::Failed;
            job.failure = Some(failure.clone());
            diff.status_changed = true;
            diff.became_terminal = Some(JobStatus::Failed);
        }
        JobMutation::Cancel => {
            if !matches!(job.status, JobStatus::Queued | JobStatus::Running) {
                return Err(StoreError::IllegalTransition {
                    job_id: job.id.clone(),
                    from: job.status,
                    attempted: JobStatus::Canceled,
                });
            }
            job.status = JobStatus::Canceled;
            job.canceled_utc = Some(Utc::now());
            diff.status_changed = true;
            diff.became_terminal = Some(JobStatus::Canceled);
        }
    }
    Ok(())
}

fn require_transition(job: &Job, expected_from: JobStatus, to: JobStatus) -> Result<(), StoreError> {
    if job.status != expected_from {
        warn!(job_id = %job.id, from = %job.status, attempted = %to, "rejected illegal state transition");
        return Err(StoreError::IllegalTransition {
            job_id: job.id.clone(),
            from: job.status,
            attempted: to,
        });
    }
    info!(job_id = %job.id, from = %job.status, to = %to, "job transition");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_types::{Aspect, Brief, Container, Density, Pacing, PauseStyle, PlanSpec, RenderSpec, RequestedTier, SystemProfile, VideoCodec, VoiceSpec};

    fn sample_job() -> Job {
        Job::new(
            CorrelationId::new(),
            Brief {
                topic: "t".into(),
                audience: "a".into(),
                goal: "g".into(),
                tone: "neutral".into(),
                language: "English".into(),
                aspect: Aspect::Widescreen16x9,
                require_narration: false,
            },
            PlanSpec {
                duration_secs: 30,
                pacing: Pacing::Fast,
                density: Density::Sparse,
                style: "default".into(),
            },
            VoiceSpec {
                voice_name: "Default".into(),
                rate: 1.0,
                pitch: 1.0,
                pause_style: PauseStyle::Natural,
            },
            RenderSpec {
                width: 1280,
                height: 720,
                container: Container::Mp4,
                video_codec: VideoCodec::H264,
                fps: 30,
                video_kbps: 4000,
                audio_kbps: 128,
                quality: 75,
                enable_scene_cut: false,
            },
            SystemProfile {
                logical_cores: 8,
                physical_cores: 4,
                ram_gib: 16,
                gpu: None,
            },
            RequestedTier::Free,
            true,
        )
    }

    fn store() -> JobStore {
        JobStore::new(Arc::new(EventBus::new(1024, std::time::Duration::from_secs(10))))
    }

    #[tokio::test]
    async fn submit_then_get_round_trips() {
        let store = store();
        let job_id = store.submit(sample_job()).unwrap();
        let job = store.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn percent_never_decreases() {
        let store = store();
        let job_id = store.submit(sample_job()).unwrap();
        store.update(&job_id, JobMutation::Start).await.unwrap();
        store.with_monotonic_progress(&job_id, 50).await.unwrap();
        store.with_monotonic_progress(&job_id, 10).await.unwrap();
        let job = store.get(&job_id).await.unwrap();
        assert_eq!(job.percent, 50);
    }

    #[tokio::test]
    async fn running_to_done_requires_running_first() {
        let store = store();
        let job_id = store.submit(sample_job()).unwrap();
        let err = store.update(&job_id, JobMutation::Complete).await.unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn terminal_jobs_reject_further_updates() {
        let store = store();
        let job_id = store.submit(sample_job()).unwrap();
        store.update(&job_id, JobMutation::Start).await.unwrap();
        store.update(&job_id, JobMutation::Complete).await.unwrap();
        let err = store.with_monotonic_progress(&job_id, 10).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyTerminal(_, JobStatus::Done)));
    }

    #[tokio::test]
    async fn cancel_is_idempotent_on_a_terminal_job() {
        let store = store();
        let job_id = store.submit(sample_job()).unwrap();
        store.update(&job_id, JobMutation::Start).await.unwrap();
        store.update(&job_id, JobMutation::Complete).await.unwrap();
        let diff = store.cancel(&job_id).await.unwrap();
        assert!(!diff.status_changed);
        let job = store.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Done);
    }

    #[tokio::test]
    async fn entering_a_stage_raises_the_percent_floor() {
        let store = store();
        let job_id = store.submit(sample_job()).unwrap();
        store.update(&job_id, JobMutation::Start).await.unwrap();
        store.update(&job_id, JobMutation::EnterStage(Stage::Voice)).await.unwrap();
        let job = store.get(&job_id).await.unwrap();
        assert_eq!(job.percent, 25);
    }

    #[tokio::test]
    async fn first_provider_recorded_for_a_stage_survives_a_later_fallback() {
        let store = store();
        let job_id = store.submit(sample_job()).unwrap();
        store.update(&job_id, JobMutation::Start).await.unwrap();
        store
            .update(&job_id, JobMutation::RecordProviderUsed(Stage::Script, "openai".into()))
            .await
            .unwrap();
        store
            .update(&job_id, JobMutation::RecordProviderUsed(Stage::Script, "rule-based".into()))
            .await
            .unwrap();
        let job = store.get(&job_id).await.unwrap();
        assert_eq!(job.provider_used_per_stage.get(&Stage::Script).unwrap(), "openai");
    }
}
