//! The job engine's single source of truth: an in-memory, per-job-locked
//! store enforcing the job status state machine, and the per-job event bus
//! subscribers stream from.

pub mod events;
pub mod store;

pub use events::EventBus;
pub use store::{JobDiff, JobMutation, JobStore, StoreError};
