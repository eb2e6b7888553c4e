//! Shared application state: the `Arc`-wrapped services every handler
//! needs a handle to. No end-user accounts and no external storage, so
//! there's nothing here beyond config, providers, the orchestrator, and
//! the event bus.

use std::sync::Arc;

use aura_jobstore::{EventBus, JobStore};
use aura_orchestrator::{EngineConfig, Orchestrator, Providers};
use aura_process::ProcessSupervisor;

use crate::config::ApiConfig;

#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub engine_config: EngineConfig,
    pub providers: Arc<Providers>,
    pub orchestrator: Arc<Orchestrator>,
    pub events: Arc<EventBus>,
}

impl AppState {
    /// `supervisor` is shared with whatever provider construction the
    /// caller already registered against it (e.g. `FfmpegVideoEncoderProvider`)
    /// so the orchestrator's own supervisor handle sees the same children.
    pub fn new(config: ApiConfig, engine_config: EngineConfig, providers: Arc<Providers>, supervisor: ProcessSupervisor) -> Self {
        let events = Arc::new(EventBus::new(engine_config.event_buffer_size, engine_config.heartbeat_interval));
        let store = Arc::new(JobStore::new(events.clone()));
        let orchestrator = Orchestrator::new(store, providers.clone(), supervisor, engine_config.clone());
        Self {
            config,
            engine_config,
            providers,
            orchestrator,
            events,
        }
    }
}
