//! Shared child-process registry: any component that spawns a subprocess
//! (the encoder, a future probe adapter) registers into one place the
//! shutdown orchestrator can drain, rather than each owning its child in
//! isolation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::process::Child;
use tracing::{info, warn};

/// Snapshot of a registered child process, safe to clone out from behind
/// the lock.
#[derive(Debug, Clone)]
pub struct ChildProcessEntry {
    pub name: String,
    pub pid: Option<u32>,
    pub started_utc: DateTime<Utc>,
    pub exited_utc: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
}

impl ChildProcessEntry {
    pub fn is_alive(&self) -> bool {
        self.exited_utc.is_none()
    }
}

struct ChildHandle {
    entry: ChildProcessEntry,
    // Held behind an async mutex, shared with the exit-watch task, so
    // `terminate_one` can still reach the live `Child` to kill it while the
    // watch task's `wait()` future is outstanding.
    child: Arc<tokio::sync::Mutex<Option<Child>>>,
}

/// Outcome of a single child's termination attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    ExitedGracefully,
    Killed,
    AlreadyExited,
    NotFound,
}

/// Registry of live child processes, shared across whichever adapters spawn
/// subprocesses. One instance per orchestrator; cheap to clone (`Arc` inside).
#[derive(Clone, Default)]
pub struct ProcessSupervisor {
    children: Arc<Mutex<HashMap<u32, ChildHandle>>>,
    next_id: Arc<Mutex<u32>>,
}

/// Handle returned by `register`, used to look the entry back up later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChildToken(u32);

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly spawned child, attaching a background task that
    /// awaits its exit and records the outcome into the shared map.
    pub fn register(&self, name: impl Into<String>, child: Child) -> ChildToken {
        let name = name.into();
        let pid = child.id();
        let entry = ChildProcessEntry {
            name: name.clone(),
            pid,
            started_utc: Utc::now(),
            exited_utc: None,
            exit_code: None,
        };

        let token = {
            let mut next_id = self.next_id.lock().unwrap();
            let id = *next_id;
            *next_id += 1;
            ChildToken(id)
        };

        let child_slot = Arc::new(tokio::sync::Mutex::new(Some(child)));

        self.children.lock().unwrap().insert(
            token.0,
            ChildHandle {
                entry,
                child: child_slot.clone(),
            },
        );

        let children = self.children.clone();
        let watch_name = name;
        tokio::spawn(async move {
            let status = {
                let mut guard = child_slot.lock().await;
                match guard.as_mut() {
                    Some(child) => child.wait().await,
                    None => return,
                }
            };
            let mut children = children.lock().unwrap();
            if let Some(handle) = children.get_mut(&token.0) {
                handle.entry.exited_utc = Some(Utc::now());
                handle.entry.exit_code = status.ok().and_then(|s| s.code());
            }
            info!(name = %watch_name, "child process exited");
        });

        token
    }

    /// Lock-free-for-the-caller snapshot of every registered child,
    /// including ones that have already exited (matches the store's
    /// "clone under lock, release immediately" convention).
    pub fn diagnostics(&self) -> Vec<ChildProcessEntry> {
        self.children
            .lock()
            .unwrap()
            .values()
            .map(|h| h.entry.clone())
            .collect()
    }

    /// Block until a registered child exits, returning its final entry.
    /// Used by adapters (the encoder) that hand ownership of the `Child`
    /// to the supervisor but still need to know how the process finished.
    pub async fn wait(&self, token: ChildToken) -> Option<ChildProcessEntry> {
        loop {
            let entry = self
                .children
                .lock()
                .unwrap()
                .get(&token.0)
                .map(|h| h.entry.clone());
            match entry {
                Some(entry) if !entry.is_alive() => return Some(entry),
                Some(_) => tokio::time::sleep(std::time::Duration::from_millis(25)).await,
                None => return None,
            }
        }
    }

    /// Terminate every still-alive registered child: graceful signal first,
    /// escalating to a hard kill for anything still alive after `timeout`.
    pub async fn terminate_all(
        &self,
        timeout: std::time::Duration,
    ) -> Vec<(String, TerminateOutcome)> {
        let ids: Vec<u32> = {
            let children = self.children.lock().unwrap();
            children
                .iter()
                .filter(|(_, h)| h.entry.is_alive())
                .map(|(id, _)| *id)
                .collect()
        };

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let name = {
                let children = self.children.lock().unwrap();
                children.get(&id).map(|h| h.entry.name.clone())
            };
            let Some(name) = name else {
                results.push(("<unknown>".to_string(), TerminateOutcome::NotFound));
                continue;
            };
            let outcome = self.terminate_one(id, timeout).await;
            results.push((name, outcome));
        }
        results
    }

    /// Terminate a single registered child by its token, for callers that
    /// only want to tear down the one process they spawned (a cancelled
    /// render) rather than every child in the registry.
    pub async fn terminate(&self, token: ChildToken, timeout: std::time::Duration) -> TerminateOutcome {
        self.terminate_one(token.0, timeout).await
    }

    async fn terminate_one(&self, id: u32, timeout: std::time::Duration) -> TerminateOutcome {
        let (pid, child_slot) = {
            let children = self.children.lock().unwrap();
            match children.get(&id) {
                Some(h) if h.entry.is_alive() => (h.entry.pid, h.child.clone()),
                Some(_) => return TerminateOutcome::AlreadyExited,
                None => return TerminateOutcome::NotFound,
            }
        };

        if let Some(pid) = pid {
            send_graceful_signal(pid);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.is_alive(id) {
                return TerminateOutcome::ExitedGracefully;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }

        let mut guard = child_slot.lock().await;
        if let Some(child) = guard.as_mut() {
            if let Err(e) = child.start_kill() {
                warn!(id, error = %e, "failed to send kill signal");
            }
        }

        TerminateOutcome::Killed
    }

    fn is_alive(&self, id: u32) -> bool {
        self.children
            .lock()
            .unwrap()
            .get(&id)
            .map(|h| h.entry.is_alive())
            .unwrap_or(false)
    }
}

#[cfg(unix)]
fn send_graceful_signal(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!(pid, error = %e, "failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn send_graceful_signal(_pid: u32) {
    // No portable graceful-terminate primitive outside unix without extra
    // platform crates; the escalation to `child.kill()` below still runs
    // after the grace period elapses.
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    #[tokio::test]
    async fn registers_and_reports_exit() {
        let supervisor = ProcessSupervisor::new();
        let child = Command::new("true")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn true");
        supervisor.register("true", child);

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        let diag = supervisor.diagnostics();
        assert_eq!(diag.len(), 1);
        assert!(!diag[0].is_alive());
        assert_eq!(diag[0].exit_code, Some(0));
    }

    #[tokio::test]
    async fn terminate_all_kills_a_long_running_child() {
        let supervisor = ProcessSupervisor::new();
        let child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn sleep");
        supervisor.register("sleep", child);

        let results = supervisor
            .terminate_all(std::time::Duration::from_millis(200))
            .await;
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0].1,
            TerminateOutcome::ExitedGracefully | TerminateOutcome::Killed
        ));
    }
}
