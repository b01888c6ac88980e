//! Command lines of the video pipeline.

use std::path::Path;

use super::encoder::VideoEncoder;
use crate::pipeline::ImageFormat;
use crate::process::CommandSpec;

/// Extension of the frames ffmpeg extracts.
pub const FRAME_EXTENSION: &str = "png";

/// `printf`-style frame name pattern shared by extraction and muxing.
pub fn frame_pattern(extension: &str) -> String {
    format!("frame%08d.{extension}")
}

pub fn probe_frame_rate(ffprobe: &Path, input: &Path) -> CommandSpec {
    CommandSpec::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=r_frame_rate",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .path_arg(input)
}

pub fn extract_frames(ffmpeg: &Path, input: &Path, frame_dir: &Path) -> CommandSpec {
    CommandSpec::new(ffmpeg)
        .arg("-i")
        .path_arg(input)
        .args(["-qscale:v", "1", "-qmin", "1", "-qmax", "1", "-vsync", "0"])
        .path_arg(&frame_dir.join(frame_pattern(FRAME_EXTENSION)))
}

pub fn enhance_frames(
    enhancer: &Path,
    frame_dir: &Path,
    enhanced_dir: &Path,
    model: &str,
    scale: u32,
    format: ImageFormat,
) -> CommandSpec {
    CommandSpec::new(enhancer)
        .arg("-i")
        .path_arg(frame_dir)
        .arg("-o")
        .path_arg(enhanced_dir)
        .args(["-n", model])
        .args(["-s".to_string(), scale.to_string()])
        .args(["-f", format.enhancer_format()])
}

pub fn list_encoders(ffmpeg: &Path) -> CommandSpec {
    CommandSpec::new(ffmpeg).args(["-hide_banner", "-encoders"])
}

/// Muxes the enhanced frames with the original audio track, if there is one.
pub fn rebuild_video(
    ffmpeg: &Path,
    frame_rate: &str,
    enhanced_dir: &Path,
    format: ImageFormat,
    input: &Path,
    encoder: VideoEncoder,
    output: &Path,
) -> CommandSpec {
    CommandSpec::new(ffmpeg)
        .args(["-y", "-r", frame_rate, "-i"])
        .path_arg(&enhanced_dir.join(frame_pattern(format.enhancer_format())))
        .arg("-i")
        .path_arg(input)
        .args(["-map", "0:v:0", "-map", "1:a:0?", "-c:a", "copy"])
        .args(encoder.codec_args().iter().copied())
        .path_arg(output)
}
