//! Job descriptions and shared pipeline types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Output image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpg,
    Jpeg,
    Webp,
}

impl ImageFormat {
    /// File extension, which is the lower-case name.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
        }
    }

    /// Value of the enhancer's `-f` flag, which is also the extension of
    /// the files it writes. The enhancer only knows `jpg` for JPEG.
    pub fn enhancer_format(&self) -> &'static str {
        match self {
            Self::Jpg | Self::Jpeg => "jpg",
            other => other.extension(),
        }
    }

    pub fn is_jpeg(&self) -> bool {
        matches!(self, Self::Jpg | Self::Jpeg)
    }

    pub fn all() -> &'static [ImageFormat] {
        &[Self::Png, Self::Jpg, Self::Jpeg, Self::Webp]
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|f| f.extension() == lower)
            .ok_or_else(|| format!("Unsupported image format: {s}"))
    }
}

/// Stages of the video pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Probing,
    ExtractingFrames,
    EnhancingFrames,
    Rebuilding,
    Done,
    Failed,
    Cancelled,
}

impl PipelineStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Stages move strictly forward, one at a time. Any running stage may
    /// fail or be cancelled; terminal stages never change.
    pub fn can_advance_to(&self, next: PipelineStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed | Self::Cancelled => true,
            _ => self.successor() == Some(next),
        }
    }

    fn successor(&self) -> Option<PipelineStage> {
        match self {
            Self::Probing => Some(Self::ExtractingFrames),
            Self::ExtractingFrames => Some(Self::EnhancingFrames),
            Self::EnhancingFrames => Some(Self::Rebuilding),
            Self::Rebuilding => Some(Self::Done),
            Self::Done | Self::Failed | Self::Cancelled => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Probing => "probing",
            Self::ExtractingFrames => "extracting_frames",
            Self::EnhancingFrames => "enhancing_frames",
            Self::Rebuilding => "rebuilding",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A video upscaling job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoJob {
    pub input_path: PathBuf,
    pub model_name: String,
    pub scale_factor: u32,
    /// Format of the enhanced intermediate frames.
    pub frame_format: ImageFormat,
    pub open_output_dir: bool,
}

impl VideoJob {
    pub fn new(input_path: impl Into<PathBuf>, model_name: impl Into<String>) -> Self {
        Self {
            input_path: input_path.into(),
            model_name: model_name.into(),
            scale_factor: 2,
            frame_format: ImageFormat::Png,
            open_output_dir: false,
        }
    }

    pub fn with_scale(mut self, scale_factor: u32) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_frame_format(mut self, format: ImageFormat) -> Self {
        self.frame_format = format;
        self
    }

    pub fn with_open_output_dir(mut self, open: bool) -> Self {
        self.open_output_dir = open;
        self
    }

    /// `<dir>/<stem>_enhanced.mp4` next to the input.
    pub fn output_path(&self) -> PathBuf {
        let stem = file_stem(&self.input_path);
        parent_dir(&self.input_path).join(format!("{stem}_enhanced.mp4"))
    }
}

/// An image upscaling job over an ordered list of inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageJob {
    pub inputs: Vec<PathBuf>,
    pub model_name: String,
    pub output_format: ImageFormat,
    pub open_output_dir: bool,
}

impl ImageJob {
    pub fn new<I, P>(inputs: I, model_name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            model_name: model_name.into(),
            output_format: ImageFormat::Png,
            open_output_dir: false,
        }
    }

    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_open_output_dir(mut self, open: bool) -> Self {
        self.open_output_dir = open;
        self
    }
}

/// Ordered list of produced outputs, one per completed input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputManifest {
    entries: Vec<PathBuf>,
}

impl OutputManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: PathBuf) {
        self.entries.push(path);
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&Path> {
        self.entries.last().map(PathBuf::as_path)
    }

    pub fn into_inner(self) -> Vec<PathBuf> {
        self.entries
    }
}

/// Outcome of a successful video run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoResult {
    pub output_path: PathBuf,
    /// Frame rate passed to the muxer, e.g. `"29.97"`.
    pub frame_rate: String,
    pub total_frames: usize,
    /// Video codec used for the output.
    pub encoder: String,
    pub duration_ms: u64,
}

/// Extensions accepted as image inputs.
pub const IMAGE_INPUT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// Extensions accepted as video inputs.
pub const VIDEO_INPUT_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "flv", "webm"];

pub fn is_supported_image(path: &Path) -> bool {
    has_extension(path, IMAGE_INPUT_EXTENSIONS)
}

pub fn is_supported_video(path: &Path) -> bool {
    has_extension(path, VIDEO_INPUT_EXTENSIONS)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .map(|ext| allowed.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Everything before the last dot of the file name.
pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

/// Directory of `path`; the current directory for bare file names.
pub(crate) fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
