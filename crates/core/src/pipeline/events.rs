//! Events reported to the caller while a pipeline runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

use super::error::ErrorKind;
use super::types::{OutputManifest, PipelineStage};

/// Caller-facing pipeline notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// The video pipeline entered a new stage.
    StageChanged { stage: PipelineStage },
    /// Human-readable status line.
    Status { message: String },
    /// Overall progress in percent (0.0 - 100.0).
    Progress { percent: f64, status: String },
    /// One image input finished.
    FileCompleted {
        index: usize,
        total: usize,
        input: PathBuf,
        output: PathBuf,
    },
    /// The image queue finished.
    ImagesFinished { manifest: OutputManifest },
    /// The video pipeline finished.
    VideoFinished { output: PathBuf },
    /// The caller should show this directory in a file manager.
    RevealRequested { directory: PathBuf },
    /// The run failed.
    Failed { kind: ErrorKind, message: String },
    /// The run was cancelled.
    Cancelled,
}

impl PipelineEvent {
    /// Whether this event ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ImagesFinished { .. }
                | Self::VideoFinished { .. }
                | Self::Failed { .. }
                | Self::Cancelled
        )
    }
}

/// Optional destination for [`PipelineEvent`]s.
///
/// A closed receiver never affects the run.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything.
    pub fn none() -> Self {
        Self { tx: None }
    }

    pub(crate) async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event).await;
        }
    }

    /// Progress is lossy: a full channel drops the update instead of
    /// slowing the pipeline down.
    pub(crate) fn progress(&self, percent: f64, status: impl Into<String>) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(PipelineEvent::Progress {
                percent,
                status: status.into(),
            });
        }
    }
}

impl From<mpsc::Sender<PipelineEvent>> for EventSink {
    fn from(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self::new(tx)
    }
}

impl From<Option<mpsc::Sender<PipelineEvent>>> for EventSink {
    fn from(tx: Option<mpsc::Sender<PipelineEvent>>) -> Self {
        Self { tx }
    }
}
