//! Async dispatch configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker pool configuration for change event dispatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Workers that stay alive for the process lifetime
    #[serde(default = "default_min_workers")]
    pub min_workers: usize,
    /// Upper bound on workers, including surge workers
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Bounded event queue capacity
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Idle time after which a surge worker exits, in seconds
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// Time limit for a single index apply, in milliseconds
    #[serde(default = "default_apply_timeout_ms")]
    pub apply_timeout_ms: u64,
}

fn default_min_workers() -> usize {
    2
}

fn default_max_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    500
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_apply_timeout_ms() -> u64 {
    5_000
}

impl DispatchConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn apply_timeout(&self) -> Duration {
        Duration::from_millis(self.apply_timeout_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            min_workers: default_min_workers(),
            max_workers: default_max_workers(),
            queue_capacity: default_queue_capacity(),
            keep_alive_secs: default_keep_alive_secs(),
            apply_timeout_ms: default_apply_timeout_ms(),
        }
    }
}
