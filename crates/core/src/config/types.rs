use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::{DEFAULT_IMAGE_MODEL, DEFAULT_VIDEO_MODEL};
use crate::pipeline::ImageFormat;
use crate::progress::WatchSettings;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub image: ImageConfig,
}

/// External tool locations. Bare names are searched on the host; anything
/// containing a path separator is used as given.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default = "default_enhancer")]
    pub enhancer: PathBuf,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enhancer: default_enhancer(),
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

fn default_enhancer() -> PathBuf {
    PathBuf::from("realesrgan-ncnn-vulkan")
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

/// Video pipeline configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct VideoConfig {
    /// Interval between scans of the enhanced frame directory
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Fail the run after this long without a new enhanced frame
    #[serde(default = "default_stall_timeout_secs")]
    pub stall_timeout_secs: u64,
    /// Upper bound for the frame rate probe
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Time a terminated tool gets before it is killed
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,
    #[serde(default = "default_video_model")]
    pub default_model: String,
    #[serde(default = "default_scale")]
    pub default_scale: u32,
    /// Format of the intermediate enhanced frames
    #[serde(default)]
    pub frame_format: ImageFormat,
    /// Parent directory for scratch workspaces (default: next to the input)
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stall_timeout_secs: default_stall_timeout_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
            terminate_grace_ms: default_terminate_grace_ms(),
            default_model: default_video_model(),
            default_scale: default_scale(),
            frame_format: ImageFormat::default(),
            workspace_root: None,
        }
    }
}

impl VideoConfig {
    pub fn watch_settings(&self) -> WatchSettings {
        WatchSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            stall_timeout: Duration::from_secs(self.stall_timeout_secs),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_stall_timeout_secs() -> u64 {
    30
}

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_terminate_grace_ms() -> u64 {
    1000
}

fn default_video_model() -> String {
    DEFAULT_VIDEO_MODEL.to_string()
}

fn default_scale() -> u32 {
    2
}

/// Image pipeline configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ImageConfig {
    #[serde(default = "default_image_model")]
    pub default_model: String,
    #[serde(default = "default_image_format")]
    pub default_format: ImageFormat,
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            default_model: default_image_model(),
            default_format: default_image_format(),
            terminate_grace_ms: default_terminate_grace_ms(),
        }
    }
}

impl ImageConfig {
    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }
}

fn default_image_model() -> String {
    DEFAULT_IMAGE_MODEL.to_string()
}

fn default_image_format() -> ImageFormat {
    ImageFormat::Jpg
}
