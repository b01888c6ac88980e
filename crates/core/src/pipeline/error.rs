//! Error types for the pipelines.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use super::types::{ImageFormat, PipelineStage};
use crate::process::ProcessError;

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// An external tool could not be started.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Destination directory does not exist and could not be created.
    #[error("Failed to create output directory {path}: {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Temporary output could not be moved to its final name.
    #[error("Failed to rename {from} to {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scratch directory could not be set up.
    #[error("Failed to create workspace at {path}: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Image job without inputs.
    #[error("No input files given")]
    NoInputs,

    /// Frame rate probe could not be started.
    #[error("Failed to read video metadata: {reason}")]
    Metadata { reason: String },

    /// Frame extraction failed or produced nothing.
    #[error("Frame extraction failed ({}): {stderr}", describe_code(.code))]
    Extraction { code: Option<i32>, stderr: String },

    /// The enhancer exited unsuccessfully.
    #[error("Enhancer failed ({}): {output}", describe_code(.code))]
    Enhancement { code: Option<i32>, output: String },

    /// The enhancer reported success but produced the wrong number of frames.
    #[error("Enhanced frame count mismatch: expected {expected}, found {actual}")]
    FrameCountMismatch { expected: usize, actual: usize },

    /// No new enhanced frames appeared for too long.
    #[error("Enhancement stalled: no new frames for {idle_secs} seconds")]
    StallTimeout { idle_secs: u64 },

    /// Converting the enhanced image to its target format failed.
    #[error(
        "Transcode to {format} failed ({}){}: {stderr}",
        describe_code(.code),
        fallback_note(.fallback_attempted)
    )]
    Transcode {
        format: ImageFormat,
        code: Option<i32>,
        stderr: String,
        fallback_attempted: bool,
    },

    /// Reassembling the video failed.
    #[error("Video rebuild failed ({}): {stderr}", describe_code(.code))]
    Rebuild { code: Option<i32>, stderr: String },

    /// The pipeline instance is already running a job.
    #[error("Pipeline is already running")]
    AlreadyRunning,

    /// A stage change that the state machine does not allow.
    #[error("Invalid stage transition from {from} to {to}")]
    InvalidTransition {
        from: PipelineStage,
        to: PipelineStage,
    },

    /// The run was cancelled.
    #[error("Cancelled")]
    Cancelled,
}

/// Stable classification of [`PipelineError`] for structured notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Launch,
    ExecutableNotFound,
    InputNotFound,
    DirectoryCreate,
    Rename,
    Workspace,
    NoInputs,
    Metadata,
    Extraction,
    Enhancement,
    FrameCountMismatch,
    StallTimeout,
    Transcode,
    Rebuild,
    AlreadyRunning,
    InvalidTransition,
    Cancelled,
}

impl PipelineError {
    /// Creates a new metadata error.
    pub fn metadata(reason: impl Into<String>) -> Self {
        Self::Metadata {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Process(ProcessError::Launch { .. }) => ErrorKind::Launch,
            Self::Process(ProcessError::ExecutableNotFound { .. }) => {
                ErrorKind::ExecutableNotFound
            }
            Self::InputNotFound { .. } => ErrorKind::InputNotFound,
            Self::DirectoryCreate { .. } => ErrorKind::DirectoryCreate,
            Self::Rename { .. } => ErrorKind::Rename,
            Self::Workspace { .. } => ErrorKind::Workspace,
            Self::NoInputs => ErrorKind::NoInputs,
            Self::Metadata { .. } => ErrorKind::Metadata,
            Self::Extraction { .. } => ErrorKind::Extraction,
            Self::Enhancement { .. } => ErrorKind::Enhancement,
            Self::FrameCountMismatch { .. } => ErrorKind::FrameCountMismatch,
            Self::StallTimeout { .. } => ErrorKind::StallTimeout,
            Self::Transcode { .. } => ErrorKind::Transcode,
            Self::Rebuild { .. } => ErrorKind::Rebuild,
            Self::AlreadyRunning => ErrorKind::AlreadyRunning,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated".to_string(),
    }
}

fn fallback_note(attempted: &bool) -> &'static str {
    if *attempted {
        " after fallback"
    } else {
        ""
    }
}
