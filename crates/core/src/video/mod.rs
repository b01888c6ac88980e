//! Video upscaling.
//!
//! The video is split into PNG frames inside a scratch workspace, the
//! enhancer upscales the whole frame directory in one call while a
//! [`crate::progress::ProgressWatcher`] counts its output, and ffmpeg muxes
//! the enhanced frames with the original audio.

pub mod commands;
mod encoder;
mod pipeline;
mod probe;
mod stage;

pub use encoder::{EncoderCapabilities, VideoEncoder};
pub use pipeline::{VideoPipeline, VideoSettings};
pub use probe::{parse_frame_rate, DEFAULT_FRAME_RATE};
