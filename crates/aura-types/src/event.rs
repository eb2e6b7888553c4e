//! Wire-level event records published through the event bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CorrelationId, EventId, JobId};
use crate::stage::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    JobStatus,
    StepStatus,
    StepProgress,
    Warning,
    Heartbeat,
    JobCompleted,
    JobFailed,
    JobCanceled,
}

/// A single ordered record in a job's event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    pub event_id: EventId,
    pub job_id: JobId,
    pub kind: EventKind,
    pub stage: Stage,
    pub percent_stage: u8,
    pub percent_overall: u8,
    pub message: String,
    pub correlation_id: CorrelationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substage_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_item: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u32>,
    pub timestamp_utc: DateTime<Utc>,
}
