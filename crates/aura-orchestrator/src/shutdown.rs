//! Ordered shutdown teardown: begin draining, warn and cancel active jobs,
//! wait for them to settle, terminate any remaining child processes, then
//! close every event stream. A dedicated, callable-once component rather
//! than logic inlined in the main loop.

use std::sync::Arc;
use std::time::Duration;

use aura_jobstore::{EventBus, JobStore};
use aura_process::ProcessSupervisor;
use aura_types::JobStatus;
use tracing::{info, warn};

/// The six ordered teardown steps, run exactly once by whichever binary
/// owns the engine's lifetime (`main.rs`'s `ctrl_c()` handler).
pub struct ShutdownOrchestrator {
    store: Arc<JobStore>,
    events: Arc<EventBus>,
    supervisor: ProcessSupervisor,
    graceful_timeout: Duration,
}

impl ShutdownOrchestrator {
    pub fn new(
        store: Arc<JobStore>,
        events: Arc<EventBus>,
        supervisor: ProcessSupervisor,
        graceful_timeout: Duration,
    ) -> Self {
        Self {
            store,
            events,
            supervisor,
            graceful_timeout,
        }
    }

    /// Drain the engine. Idempotent in the sense that a second call simply
    /// finds nothing left to cancel, but is meant to be called once.
    pub async fn run(&self) {
        info!("shutdown: step 1 — marking the store draining");
        self.store.begin_draining();

        let active: Vec<_> = self
            .store
            .list()
            .await
            .into_iter()
            .filter(|job| !job.status.is_terminal())
            .collect();

        info!(active = active.len(), "shutdown: step 2 — warning active jobs");
        for job in &active {
            let _ = self
                .store
                .update(
                    &job.id,
                    aura_jobstore::JobMutation::AddWarning("shutting_down".to_string()),
                )
                .await;
        }

        info!("shutdown: step 3 — canceling active jobs");
        for job in &active {
            let _ = self.store.cancel(&job.id).await;
        }
        self.wait_for_jobs_to_settle(&active, self.graceful_timeout).await;

        info!("shutdown: step 4 — terminating supervised child processes");
        let outcomes = self.supervisor.terminate_all(self.graceful_timeout).await;
        for (name, outcome) in &outcomes {
            info!(name, ?outcome, "child process terminated during shutdown");
        }

        info!("shutdown: step 5 — closing event bus subscribers");
        self.events.close_all();

        info!("shutdown: step 6 — shutdown complete (cleanup scopes close per-job as each pipeline task unwinds)");
    }

    /// Poll the canceled jobs until every one reaches a terminal status or
    /// `timeout` elapses, mirroring `wait_for_jobs`'s drain loop (there:
    /// polling a semaphore back to full capacity; here: polling job
    /// status, since there is no single permit the orchestrator can await).
    async fn wait_for_jobs_to_settle(&self, jobs: &[aura_types::Job], timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let mut all_terminal = true;
            for job in jobs {
                match self.store.get(&job.id).await {
                    Ok(snapshot) if !snapshot.status.is_terminal() => {
                        all_terminal = false;
                        break;
                    }
                    _ => {}
                }
            }
            if all_terminal {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("shutdown: graceful_timeout elapsed with jobs still running, proceeding to terminate processes");
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_jobstore::JobMutation;
    use aura_types::{
        Aspect, Brief, Container, CorrelationId, Density, Job, Pacing, PauseStyle, PlanSpec,
        RenderSpec, RequestedTier, SystemProfile, VideoCodec, VoiceSpec,
    };

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

    #[tokio::test]
    async fn shutdown_cancels_every_active_job_and_marks_the_store_draining() {
        let events = Arc::new(EventBus::new(64, Duration::from_secs(10)));
        let store = Arc::new(JobStore::new(events.clone()));
        let job_id = store.submit(sample_job()).unwrap();
        store.update(&job_id, JobMutation::Start).await.unwrap();

        let shutdown = ShutdownOrchestrator::new(store.clone(), events, ProcessSupervisor::new(), Duration::from_millis(200));
        shutdown.run().await;

        let job = store.get(&job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Canceled);
        assert!(store.is_draining());

        let err = store.submit(sample_job());
        // submit() doesn't itself check draining; that's the API layer's
        // job, since draining only gates acceptance at the surface the
        // caller owns. Confirm the flag is readable for that gate instead.
        assert!(err.is_ok());
        assert!(store.is_draining());
    }

    #[tokio::test]
    async fn shutdown_with_no_active_jobs_completes_immediately() {
        let events = Arc::new(EventBus::new(64, Duration::from_secs(10)));
        let store = Arc::new(JobStore::new(events.clone()));
        let shutdown = ShutdownOrchestrator::new(store, events, ProcessSupervisor::new(), Duration::from_millis(200));
        shutdown.run().await;
    }
}
