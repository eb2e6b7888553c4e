//! Process supervision and explicit temp-path cleanup shared by any
//! component that spawns subprocesses or writes scratch files.

pub mod cleanup;
pub mod supervisor;

pub use cleanup::CleanupScope;
pub use supervisor::{ChildProcessEntry, ChildToken, ProcessSupervisor, TerminateOutcome};
