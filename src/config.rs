//! Worker configuration
//!
//! Workers take their settings as explicit values; nothing in the library reads
//! globals.  `from_env` exists for process startup only.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::{Result, WorkerError};

pub const DEFAULT_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_QUEUE_CAPACITY: usize = 250;
pub const DEFAULT_MAX_RESTARTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// time between fetch ticks
    pub interval_ms: u64,
    /// worker name; a random id is used when missing
    pub name: Option<String>,
    /// mailbox size shared by ticks and queries
    pub queue_capacity: usize,
    /// how many times a crashed worker is restarted before it stays down
    pub max_restarts: u32,
    /// a fetch that takes longer than this counts as a failed tick
    pub fetch_timeout_ms: Option<u64>,
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the config from environment variables.
    ///
    /// # Environment Variables
    /// - `FETCH_INTERVAL_MS` - tick interval (default: 1000)
    /// - `FETCH_WORKER_NAME` - worker name (default: none)
    /// - `FETCH_QUEUE_CAPACITY` - mailbox size (default: 250)
    /// - `FETCH_MAX_RESTARTS` - restart limit (default: 3)
    /// - `FETCH_TIMEOUT_MS` - fetch timeout (default: none)
    pub fn from_env() -> Self {
        Self {
            interval_ms: env::var("FETCH_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_INTERVAL_MS),
            name: env::var("FETCH_WORKER_NAME")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            queue_capacity: env::var("FETCH_QUEUE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
            max_restarts: env::var("FETCH_MAX_RESTARTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_RESTARTS),
            fetch_timeout_ms: env::var("FETCH_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_max_restarts(mut self, max_restarts: u32) -> Self {
        self.max_restarts = max_restarts;
        self
    }

    pub fn with_fetch_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.fetch_timeout_ms = Some(timeout_ms);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(WorkerError::InvalidConfig(
                "interval_ms must be greater than zero".to_string(),
            ));
        }

        if self.queue_capacity == 0 {
            return Err(WorkerError::InvalidConfig(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }

        if self.fetch_timeout_ms == Some(0) {
            return Err(WorkerError::InvalidConfig(
                "fetch_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(WorkerError::InvalidConfig("name is blank".to_string()));
            }
        }

        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            name: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_restarts: DEFAULT_MAX_RESTARTS,
            fetch_timeout_ms: None,
        }
    }
}
