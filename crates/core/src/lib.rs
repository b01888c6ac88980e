pub mod config;
pub mod image;
pub mod models;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod reveal;
pub mod testing;
pub mod video;
pub mod workspace;

pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError, ImageConfig, ToolsConfig, VideoConfig,
};
pub use image::ImagePipeline;
pub use pipeline::{
    is_supported_image, is_supported_video, ErrorKind, EventSink, ImageFormat, ImageJob,
    OutputManifest, PipelineError, PipelineEvent, PipelineStage, VideoJob, VideoResult,
    IMAGE_INPUT_EXTENSIONS, VIDEO_INPUT_EXTENSIONS,
};
pub use process::{
    locate_executable, CommandSpec, ProcessError, ProcessHandle, ProcessRunner,
    TokioProcessRunner, ToolPaths,
};
pub use progress::{ProgressEvent, ProgressWatcher, WatchError, WatchSettings};
pub use video::{VideoPipeline, VideoSettings};
pub use workspace::TempWorkspace;
