//! Run exclusivity and cancellation shared by both pipelines.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::error::PipelineError;

#[derive(Debug, Default)]
pub(crate) struct RunControl {
    token: Mutex<CancellationToken>,
    running: AtomicBool,
}

/// Clears the running flag when the run ends, including when the run
/// future is dropped.
#[derive(Debug)]
pub(crate) struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl RunControl {
    /// Marks a run as started and returns its token. A token consumed by an
    /// earlier cancellation is replaced with a fresh one.
    pub(crate) fn begin(&self) -> Result<(RunGuard<'_>, CancellationToken), PipelineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(PipelineError::AlreadyRunning);
        }
        let guard = RunGuard {
            running: &self.running,
        };

        let mut token = self.token.lock().unwrap_or_else(|e| e.into_inner());
        if token.is_cancelled() {
            *token = CancellationToken::new();
        }
        Ok((guard, token.clone()))
    }

    pub(crate) fn token(&self) -> CancellationToken {
        self.token.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn cancel(&self) {
        self.token().cancel();
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
