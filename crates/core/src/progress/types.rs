//! Types for progress watching.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Timer settings of a [`super::ProgressWatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSettings {
    /// Interval between directory scans.
    pub poll_interval: Duration,
    /// How long without a new file before the watched work counts as stalled.
    pub stall_timeout: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            stall_timeout: Duration::from_secs(30),
        }
    }
}

/// Snapshot of the processed/total ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub processed: usize,
    pub total: usize,
    /// Set on the last event, when `processed` reached `total`.
    pub finished: bool,
}

impl ProgressEvent {
    /// Progress in percent (0.0 - 100.0).
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f64 * 100.0 / self.total as f64
        }
    }
}

/// Errors reported by a watcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    /// No new matching file appeared for the stall timeout.
    #[error("No new files in {dir} for {idle_secs} seconds")]
    Stalled { dir: PathBuf, idle_secs: u64 },
}
