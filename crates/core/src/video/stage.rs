//! Forward-only stage tracking for the video pipeline.

use tracing::info;

use crate::pipeline::{PipelineError, PipelineStage};

#[derive(Debug)]
pub(crate) struct StageTracker {
    current: PipelineStage,
}

impl StageTracker {
    pub(crate) fn new() -> Self {
        Self {
            current: PipelineStage::Probing,
        }
    }

    pub(crate) fn current(&self) -> PipelineStage {
        self.current
    }

    pub(crate) fn advance(&mut self, next: PipelineStage) -> Result<(), PipelineError> {
        if !self.current.can_advance_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        info!(from = %self.current, to = %next, "Video pipeline stage");
        self.current = next;
        Ok(())
    }

    /// Moves to `Failed` or `Cancelled` unless a terminal stage was already
    /// reached.
    pub(crate) fn finish_with(&mut self, terminal: PipelineStage) {
        if !self.current.is_terminal() {
            self.current = terminal;
        }
    }
}
