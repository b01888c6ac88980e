//! Driving one external process to completion under a cancellation token.

use std::collections::VecDeque;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::PipelineError;
use crate::process::{CommandSpec, CompletedProcess, ProcessRunner};

/// Starts `spec` and waits for it, collecting its output.
///
/// If `cancel` fires first the process is shut down (terminate, grace, kill)
/// and reaped before `Cancelled` is returned. A process that completes after
/// cancellation was requested is discarded the same way.
pub(crate) async fn run_to_completion<R>(
    runner: &R,
    spec: &CommandSpec,
    cancel: &CancellationToken,
    grace: Duration,
) -> Result<CompletedProcess, PipelineError>
where
    R: ProcessRunner + ?Sized,
{
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let mut handle = runner.start(spec).await?;
    tokio::select! {
        completed = handle.wait_with_output() => {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            debug!(
                program = %spec.program_name(),
                code = ?completed.exit.code,
                "Process completed"
            );
            Ok(completed)
        }
        _ = cancel.cancelled() => {
            handle.shutdown(grace).await;
            Err(PipelineError::Cancelled)
        }
    }
}

/// Keeps the last lines of a long-running tool's output for error messages.
#[derive(Debug)]
pub(crate) struct OutputTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl OutputTail {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, line: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub(crate) fn joined(&self) -> String {
        self.lines
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
