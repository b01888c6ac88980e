//! Directory-polling progress watcher.

use futures::stream::{self, Stream};
use std::path::{Path, PathBuf};
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace};

use super::types::{ProgressEvent, WatchError, WatchSettings};

/// Counts files appearing in a directory and turns the count into progress.
///
/// The watcher does not spawn anything: the owner drives it by awaiting
/// [`ProgressWatcher::next_event`], typically inside a `select!` next to the
/// process producing the files.
#[derive(Debug)]
pub struct ProgressWatcher {
    dir: PathBuf,
    extension: String,
    total: usize,
    processed: usize,
    last_progress: Instant,
    settings: WatchSettings,
    interval: Interval,
    stopped: bool,
}

impl ProgressWatcher {
    /// Watches `dir` for files ending in `.{extension}` until `total` exist.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        dir: impl Into<PathBuf>,
        extension: &str,
        total: usize,
        settings: WatchSettings,
    ) -> Self {
        let start = Instant::now();
        let mut interval = interval_at(start + settings.poll_interval, settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            dir: dir.into(),
            extension: extension.trim_start_matches('.').to_ascii_lowercase(),
            total,
            processed: 0,
            last_progress: start,
            settings,
            interval,
            stopped: false,
        }
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Stops the watcher. Calling it again is a no-op.
    pub fn stop(&mut self) {
        if !self.stopped {
            trace!(dir = %self.dir.display(), "Progress watcher stopped");
        }
        self.stopped = true;
    }

    /// Waits for the next change.
    ///
    /// Returns `None` once the watcher is stopped, either explicitly, after
    /// the final event, or after a stall.
    pub async fn next_event(&mut self) -> Option<Result<ProgressEvent, WatchError>> {
        while !self.stopped {
            self.interval.tick().await;
            if let Some(outcome) = self.check() {
                return Some(outcome);
            }
        }
        None
    }

    /// Counts immediately, outside the timer. Never reports a stall.
    pub fn poll_now(&mut self) -> Option<ProgressEvent> {
        if self.stopped {
            return None;
        }
        let count = count_matching(&self.dir, &self.extension);
        self.observe(count)
    }

    /// The watcher as a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = Result<ProgressEvent, WatchError>> {
        stream::unfold(self, |mut watcher| async move {
            watcher.next_event().await.map(|event| (event, watcher))
        })
    }

    fn check(&mut self) -> Option<Result<ProgressEvent, WatchError>> {
        let count = count_matching(&self.dir, &self.extension);
        // Reaching the total wins over a stall detected in the same tick.
        if let Some(event) = self.observe(count) {
            return Some(Ok(event));
        }

        let idle = self.last_progress.elapsed();
        if idle >= self.settings.stall_timeout {
            debug!(
                dir = %self.dir.display(),
                processed = self.processed,
                total = self.total,
                idle_secs = idle.as_secs(),
                "No new files, watcher stalled"
            );
            self.stopped = true;
            return Some(Err(WatchError::Stalled {
                dir: self.dir.clone(),
                idle_secs: idle.as_secs(),
            }));
        }
        None
    }

    fn observe(&mut self, count: usize) -> Option<ProgressEvent> {
        let processed = count.min(self.total);
        if processed > self.processed {
            self.processed = processed;
            self.last_progress = Instant::now();
        } else if self.processed < self.total {
            return None;
        }

        let finished = self.processed >= self.total;
        if finished {
            self.stopped = true;
        }
        Some(ProgressEvent {
            processed: self.processed,
            total: self.total,
            finished,
        })
    }
}

/// Number of regular files in `dir` whose extension matches, ignoring case.
/// A missing or unreadable directory counts as empty.
pub fn count_matching(dir: &Path, extension: &str) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| {
            entry
                .path()
                .extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
                .unwrap_or(false)
        })
        .count()
}
