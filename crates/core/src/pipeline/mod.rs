//! Types shared by the image and video pipelines.
//!
//! Both pipelines report through [`PipelineEvent`]s, end with a
//! [`PipelineError`] on every failure path, and allow one run at a time per
//! instance.

mod control;
mod error;
mod events;
mod supervise;
mod types;

pub use error::{ErrorKind, PipelineError};
pub use events::{EventSink, PipelineEvent};
pub use types::{
    is_supported_image, is_supported_video, ImageFormat, ImageJob, OutputManifest,
    PipelineStage, VideoJob, VideoResult, IMAGE_INPUT_EXTENSIONS, VIDEO_INPUT_EXTENSIONS,
};

pub(crate) use control::RunControl;
pub(crate) use supervise::{run_to_completion, OutputTail};
pub(crate) use types::{file_stem, parent_dir};
