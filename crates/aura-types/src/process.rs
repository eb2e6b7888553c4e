//! Metadata shape for supervised child processes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildProcessEntry {
    pub name: String,
    pub pid: u32,
    pub started_utc: DateTime<Utc>,
    pub exited_utc: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub metadata: HashMap<String, String>,
}

impl ChildProcessEntry {
    pub fn is_alive(&self) -> bool {
        self.exited_utc.is_none()
    }
}
