//! The central `Job` entity and its terminal-state payloads.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error_code::ErrorCode;
use crate::ids::{CorrelationId, JobId};
use crate::request::{Brief, PlanSpec, RenderSpec, RequestedTier, VoiceSpec};
use crate::stage::Stage;
use crate::system_profile::SystemProfile;

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An artifact produced by a job (today: always the final rendered video,
/// but kept general in case postprocess ever emits more than one).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub path: String,
    pub size_bytes: u64,
    pub kind: String,
}

/// Populated on `JobStatus::Failed`; never carries stack traces or
/// credential material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub stage: Stage,
    pub error_code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<String>,
    pub suggested_actions: Vec<String>,
}

/// The central job entity. One instance per accepted request, owned
/// exclusively by `aura-jobstore::JobStore`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub correlation_id: CorrelationId,

    pub brief: Brief,
    pub plan: PlanSpec,
    pub voice: VoiceSpec,
    pub render: RenderSpec,
    pub system_profile: SystemProfile,
    pub requested_tier: RequestedTier,
    pub offline_only: bool,

    pub created_utc: DateTime<Utc>,
    pub started_utc: Option<DateTime<Utc>>,
    pub completed_utc: Option<DateTime<Utc>>,
    pub canceled_utc: Option<DateTime<Utc>>,
    pub ended_utc: Option<DateTime<Utc>>,

    pub status: JobStatus,
    pub stage: Stage,
    pub percent: u8,

    pub provider_used_per_stage: HashMap<Stage, String>,
    pub warnings: Vec<String>,
    pub artifacts: Vec<Artifact>,
    pub failure: Option<Failure>,
}

impl Job {
    /// Construct a freshly-accepted job in `Queued` state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        correlation_id: CorrelationId,
        brief: Brief,
        plan: PlanSpec,
        voice: VoiceSpec,
        render: RenderSpec,
        system_profile: SystemProfile,
        requested_tier: RequestedTier,
        offline_only: bool,
    ) -> Self {
        Self {
            id: JobId::new(),
            correlation_id,
            brief,
            plan,
            voice,
            render,
            system_profile,
            requested_tier,
            offline_only,
            created_utc: Utc::now(),
            started_utc: None,
            completed_utc: None,
            canceled_utc: None,
            ended_utc: None,
            status: JobStatus::Queued,
            stage: Stage::Initialization,
            percent: 0,
            provider_used_per_stage: HashMap::new(),
            warnings: Vec::new(),
            artifacts: Vec::new(),
            failure: None,
        }
    }

    /// Timestamp ordering invariant :
    /// `created ≤ started ≤ completed|canceled ≤ ended`.
    pub fn timestamps_well_ordered(&self) -> bool {
        if let Some(started) = self.started_utc {
            if started < self.created_utc {
                return false;
            }
        }
        let terminal_ts = self.completed_utc.or(self.canceled_utc);
        if let (Some(started), Some(terminal)) = (self.started_utc, terminal_ts) {
            if terminal < started {
                return false;
            }
        }
        if let (Some(terminal), Some(ended)) = (terminal_ts, self.ended_utc) {
            if ended < terminal {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Aspect, Container, Density, Pacing, PauseStyle, VideoCodec};
    use crate::system_profile::SystemProfile;

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

    #[test]
    fn new_job_starts_queued_at_zero_percent() {
        let job = sample_job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.percent, 0);
        assert!(job.timestamps_well_ordered());
    }

    #[test]
    fn out_of_order_timestamps_are_detected() {
        let mut job = sample_job();
        job.started_utc = Some(Utc::now());
        job.completed_utc = Some(job.created_utc - chrono::Duration::seconds(1));
        assert!(!job.timestamps_well_ordered());
    }
}
