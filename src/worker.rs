/// worker support structs
///
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

pub type JsonString = String;

pub const OK: &str = "ok";
pub const DOWN: &str = "down";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerState {
    #[default]
    Idle,
    Busy,
    Broken,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStatus {
    pub worker_id: String,
    pub name: String,
    pub status: String,
    pub state: WorkerState,
    pub uptime: String,
    pub error_count: u16,
    pub fetch_count: u64,
    pub fetch_errors: u64,
    pub unrecognized_count: u64,
    pub seen_count: usize,
    pub restarts: u32,
}

impl WorkerStatus {
    /// the status reported for a worker that no longer answers requests
    pub fn down(worker_id: &str, name: &str) -> WorkerStatus {
        WorkerStatus {
            worker_id: worker_id.to_string(),
            name: name.to_string(),
            status: DOWN.to_string(),
            state: WorkerState::Broken,
            uptime: String::new(),
            error_count: 0,
            fetch_count: 0,
            fetch_errors: 0,
            unrecognized_count: 0,
            seen_count: 0,
            restarts: 0,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == OK
    }
}

/// create a random 16 character worker id
pub fn create_worker_id() -> String {
    std::iter::repeat_with(fastrand::alphanumeric)
        .take(16)
        .collect()
}

/// elapsed time since a worker was started
#[derive(Debug, Clone, Copy)]
pub struct Uptime {
    started: Instant,
}

impl Uptime {
    pub fn new() -> Uptime {
        Uptime {
            started: Instant::now(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for Uptime {
    fn default() -> Self {
        Uptime::new()
    }
}

impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.get_uptime_seconds();
        let days = secs / 86_400;
        let hours = (secs % 86_400) / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;

        write!(
            f,
            "{} days, {:02}:{:02}:{:02}",
            days, hours, minutes, seconds
        )
    }
}
