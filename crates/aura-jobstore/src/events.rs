//! Per-job ordered event buffer plus `broadcast` fan-out to subscribers.
//!
//! A bounded ring buffer holds recent history for replay-on-resume, and
//! `tokio::sync::broadcast` fans each new event out to live subscribers —
//! all in-process, since this core has no cross-process durability
//! requirement.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use aura_types::{CorrelationId, EventId, EventKind, Job, JobEvent, JobId, JobStatus, Stage};
use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

/// Bound on a subscriber's own outgoing channel before it's dropped for
/// falling behind.
const SUBSCRIBER_BACKLOG: usize = 64;

struct JobChannel {
    buffer: Mutex<VecDeque<JobEvent>>,
    capacity: usize,
    sender: broadcast::Sender<JobEvent>,
    last_ms: AtomicI64,
    counter: AtomicU64,
}

impl JobChannel {
    fn new(capacity: usize) -> Self {
        let (sender, _rx) = broadcast::channel(capacity.max(16));
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            sender,
            last_ms: AtomicI64::new(0),
            counter: AtomicU64::new(0),
        }
    }

    /// `{unix_ms}-{counter}`, counter resets whenever the millisecond
    /// advances so IDs stay strictly increasing per job.
    fn next_event_id(&self) -> EventId {
        let now_ms = Utc::now().timestamp_millis();
        loop {
            let last = self.last_ms.load(Ordering::SeqCst);
            if now_ms > last {
                if self
                    .last_ms
                    .compare_exchange(last, now_ms, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    self.counter.store(0, Ordering::SeqCst);
                    return EventId::new(now_ms, 0);
                }
                continue;
            }
            let counter = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
            return EventId::new(last.max(now_ms), counter);
        }
    }

    fn push(&self, event: JobEvent) {
        {
            let mut buffer = self.buffer.lock().unwrap();
            if buffer.len() >= self.capacity {
                buffer.pop_front();
            }
            buffer.push_back(event.clone());
        }
        // No receivers is not an error: a job can run before anyone subscribes.
        let _ = self.sender.send(event);
    }

    fn replay_since(&self, last_event_id: &EventId) -> ReplayOutcome {
        let buffer = self.buffer.lock().unwrap();
        match buffer.iter().position(|e| &e.event_id == last_event_id) {
            Some(pos) => ReplayOutcome::Events(buffer.iter().skip(pos + 1).cloned().collect()),
            None => {
                let still_ahead = buffer
                    .front()
                    .map(|front| front.event_id > *last_event_id)
                    .unwrap_or(false);
                if still_ahead {
                    ReplayOutcome::Evicted
                } else {
                    // last_event_id is ahead of everything we have (e.g. the
                    // job hasn't produced anything since): nothing to replay.
                    ReplayOutcome::Events(Vec::new())
                }
            }
        }
    }
}

enum ReplayOutcome {
    Events(Vec<JobEvent>),
    Evicted,
}

/// Per-job ring buffers plus broadcast fan-out, shared by the store (which
/// publishes) and the API layer (which subscribes).
pub struct EventBus {
    channels: Mutex<HashMap<JobId, std::sync::Arc<JobChannel>>>,
    capacity: usize,
    heartbeat_interval: Duration,
}

impl EventBus {
    pub fn new(capacity: usize, heartbeat_interval: Duration) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity,
            heartbeat_interval,
        }
    }

    fn channel(&self, job_id: &JobId) -> std::sync::Arc<JobChannel> {
        let mut channels = self.channels.lock().unwrap();
        channels
            .entry(job_id.clone())
            .or_insert_with(|| std::sync::Arc::new(JobChannel::new(self.capacity)))
            .clone()
    }

    fn publish(
        &self,
        job_id: &JobId,
        kind: EventKind,
        stage: Stage,
        percent_stage: u8,
        percent_overall: u8,
        message: String,
        correlation_id: CorrelationId,
        substage_detail: Option<String>,
        current_item: Option<u32>,
        total_items: Option<u32>,
    ) {
        let channel = self.channel(job_id);
        let event = JobEvent {
            event_id: channel.next_event_id(),
            job_id: job_id.clone(),
            kind,
            stage,
            percent_stage,
            percent_overall,
            message,
            correlation_id,
            substage_detail,
            current_item,
            total_items,
            timestamp_utc: Utc::now(),
        };
        channel.push(event);
    }

    pub fn publish_status(&self, job_id: &JobId, status: JobStatus, stage: Stage, percent: u8, correlation_id: CorrelationId) {
        self.publish(
            job_id,
            EventKind::JobStatus,
            stage,
            percent,
            percent,
            format!("job is now {status}"),
            correlation_id,
            None,
            None,
            None,
        );
    }

    pub fn publish_stage(&self, job_id: &JobId, stage: Stage, percent: u8, correlation_id: CorrelationId) {
        self.publish(
            job_id,
            EventKind::StepStatus,
            stage,
            0,
            percent,
            format!("entered stage {stage}"),
            correlation_id,
            None,
            None,
            None,
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn publish_progress(
        &self,
        job_id: &JobId,
        stage: Stage,
        percent_overall: u8,
        correlation_id: CorrelationId,
        substage_detail: Option<String>,
        current_item: Option<u32>,
        total_items: Option<u32>,
    ) {
        self.publish(
            job_id,
            EventKind::StepProgress,
            stage,
            percent_overall,
            percent_overall,
            "progress update".to_string(),
            correlation_id,
            substage_detail,
            current_item,
            total_items,
        );
    }

    pub fn publish_warning(&self, job_id: &JobId, stage: Stage, percent: u8, correlation_id: CorrelationId, message: String) {
        self.publish(
            job_id,
            EventKind::Warning,
            stage,
            percent,
            percent,
            message,
            correlation_id,
            None,
            None,
            None,
        );
    }

    pub fn publish_terminal(&self, job: &Job, status: JobStatus) {
        let kind = match status {
            JobStatus::Done => EventKind::JobCompleted,
            JobStatus::Failed => EventKind::JobFailed,
            JobStatus::Canceled => EventKind::JobCanceled,
            _ => return,
        };
        let message = match &job.failure {
            Some(failure) => failure.message.clone(),
            None => format!("job {status}"),
        };
        self.publish(
            &job.id,
            kind,
            job.stage,
            job.percent,
            job.percent,
            message,
            job.correlation_id.clone(),
            None,
            None,
            None,
        );
    }

    /// Release every per-job ring buffer, as the last step of shutdown. Subscriber
    /// tasks themselves already end when their job's terminal event comes
    /// through (every job is canceled before this runs); this just stops
    /// the bus retaining replay history for jobs nobody will query again.
    pub fn close_all(&self) {
        self.channels.lock().unwrap().clear();
    }

    /// Subscribe from `last_event_id` (or from the live tail if absent),
    /// returning an `mpsc::Receiver` the caller drives (the API layer turns
    /// this into an SSE stream). Spawns a forwarding task that sends the
    /// replay backlog first, then live events, with a heartbeat injected
    /// after `heartbeat_interval` of silence and a hard drop once the
    /// subscriber's own backlog fills up.
    pub fn subscribe(&self, job_id: &JobId, last_event_id: Option<EventId>) -> mpsc::Receiver<JobEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BACKLOG);
        let channel = self.channel(job_id);
        let mut broadcast_rx = channel.sender.subscribe();
        let heartbeat_interval = self.heartbeat_interval;
        let job_id = job_id.clone();

        tokio::spawn(async move {
            let backlog = match last_event_id {
                Some(id) => match channel.replay_since(&id) {
                    ReplayOutcome::Events(events) => events,
                    ReplayOutcome::Evicted => {
                        vec![resync_event(&job_id)]
                    }
                },
                None => Vec::new(),
            };

            for event in backlog {
                if tx.try_send(event).is_err() {
                    warn!(job_id = %job_id, "subscriber backlog exceeded during replay, dropping subscriber");
                    return;
                }
            }

            loop {
                tokio::select! {
                    received = broadcast_rx.recv() => {
                        match received {
                            Ok(event) => {
                                let terminal = matches!(
                                    event.kind,
                                    EventKind::JobCompleted | EventKind::JobFailed | EventKind::JobCanceled
                                );
                                match tx.try_send(event) {
                                    Ok(()) => {}
                                    Err(mpsc::error::TrySendError::Full(_)) => {
                                        warn!(job_id = %job_id, "subscriber backlog exceeded, dropping subscriber");
                                        return;
                                    }
                                    Err(mpsc::error::TrySendError::Closed(_)) => return,
                                }
                                if terminal {
                                    return;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(job_id = %job_id, skipped, "subscriber lagged behind the live broadcast");
                                continue;
                            }
                            Err(broadcast::error::RecvError::Closed) => return,
                        }
                    }
                    _ = tokio::time::sleep(heartbeat_interval) => {
                        let hb = heartbeat_event(&job_id);
                        if tx.try_send(hb).is_err() {
                            return;
                        }
                    }
                }
            }
        });

        rx
    }
}

fn heartbeat_event(job_id: &JobId) -> JobEvent {
    JobEvent {
        event_id: EventId::new(Utc::now().timestamp_millis(), 0),
        job_id: job_id.clone(),
        kind: EventKind::Heartbeat,
        stage: Stage::Initialization,
        percent_stage: 0,
        percent_overall: 0,
        message: "heartbeat".to_string(),
        correlation_id: CorrelationId::new(),
        substage_detail: None,
        current_item: None,
        total_items: None,
        timestamp_utc: Utc::now(),
    }
}

fn resync_event(job_id: &JobId) -> JobEvent {
    JobEvent {
        event_id: EventId::new(Utc::now().timestamp_millis(), 0),
        job_id: job_id.clone(),
        kind: EventKind::Warning,
        stage: Stage::Initialization,
        percent_stage: 0,
        percent_overall: 0,
        message: "resync: requested last_event_id has been evicted from the buffer; resuming from the live tail".to_string(),
        correlation_id: CorrelationId::new(),
        substage_detail: None,
        current_item: None,
        total_items: None,
        timestamp_utc: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> EventBus {
        EventBus::new(4, Duration::from_millis(50))
    }

    #[test]
    fn event_ids_are_strictly_increasing_within_a_millisecond() {
        let channel = JobChannel::new(16);
        let a = channel.next_event_id();
        let b = channel.next_event_id();
        assert!(a < b);
    }

    #[tokio::test]
    async fn subscriber_with_no_last_id_sees_live_events_only() {
        let bus = bus();
        let job_id = JobId::new();
        bus.publish_status(&job_id, JobStatus::Queued, Stage::Initialization, 0, CorrelationId::new());

        let mut rx = bus.subscribe(&job_id, None);
        bus.publish_status(&job_id, JobStatus::Running, Stage::Script, 0, CorrelationId::new());

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::JobStatus);
    }

    #[tokio::test]
    async fn resume_from_last_event_id_replays_only_newer_events() {
        let bus = bus();
        let job_id = JobId::new();
        bus.publish_status(&job_id, JobStatus::Queued, Stage::Initialization, 0, CorrelationId::new());
        bus.publish_stage(&job_id, Stage::Script, 0, CorrelationId::new());
        let channel = bus.channel(&job_id);
        let first_id = channel.buffer.lock().unwrap().front().unwrap().event_id.clone();
        bus.publish_stage(&job_id, Stage::Voice, 25, CorrelationId::new());

        let mut rx = bus.subscribe(&job_id, Some(first_id));
        let replayed = rx.recv().await.unwrap();
        assert_eq!(replayed.stage, Stage::Script);
        let replayed2 = rx.recv().await.unwrap();
        assert_eq!(replayed2.stage, Stage::Voice);
    }

    #[tokio::test]
    async fn eviction_triggers_a_resync_event() {
        let bus = bus(); // capacity 4
        let job_id = JobId::new();
        bus.publish_status(&job_id, JobStatus::Queued, Stage::Initialization, 0, CorrelationId::new());
        let channel = bus.channel(&job_id);
        let stale_id = channel.buffer.lock().unwrap().front().unwrap().event_id.clone();

        for i in 0..10 {
            bus.publish_stage(&job_id, Stage::Script, i, CorrelationId::new());
        }

        let mut rx = bus.subscribe(&job_id, Some(stale_id));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Warning);
        assert!(event.message.starts_with("resync"));
    }

    #[tokio::test]
    async fn heartbeat_is_injected_after_silence() {
        let bus = bus();
        let job_id = JobId::new();
        let mut rx = bus.subscribe(&job_id, None);
        let event = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.kind, EventKind::Heartbeat);
    }
}
