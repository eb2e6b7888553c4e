//! Ties together provider selection, the staged pipeline executor, and
//! ordered shutdown into the engine's orchestration layer. Runs entirely
//! in memory — no external store or object storage backs any of it.

pub mod config;
pub mod pipeline;
pub mod selection;
pub mod shutdown;

pub use config::{EngineConfig, StageRetryConfig};
pub use pipeline::{Orchestrator, Providers};
pub use selection::{select_chain, SelectionRecord};
pub use shutdown::ShutdownOrchestrator;
