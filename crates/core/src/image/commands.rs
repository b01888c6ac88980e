//! Command lines of the image pipeline.

use std::path::{Path, PathBuf};

use crate::pipeline::{file_stem, parent_dir, ImageFormat};
use crate::process::CommandSpec;

/// Scale-down applied when the first JPEG encode fails.
const JPEG_FALLBACK_SCALE: &str = "scale=iw/1.3:ih/1.3";

/// Intermediate and final output paths for one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOutputs {
    pub dir: PathBuf,
    /// `<dir>/<stem>_temp.png`, written by the enhancer.
    pub temp: PathBuf,
    /// `<dir>/<stem>-ENLARGE.<ext>`.
    pub final_path: PathBuf,
}

impl ImageOutputs {
    pub fn for_input(input: &Path, format: ImageFormat) -> Self {
        let dir = parent_dir(input);
        let stem = file_stem(input);
        Self {
            temp: dir.join(format!("{stem}_temp.png")),
            final_path: dir.join(format!("{stem}-ENLARGE.{}", format.extension())),
            dir,
        }
    }
}

pub fn enhance(enhancer: &Path, input: &Path, output: &Path, model: &str) -> CommandSpec {
    CommandSpec::new(enhancer)
        .arg("-i")
        .path_arg(input)
        .arg("-o")
        .path_arg(output)
        .args(["-n", model])
}

/// The single transcode for `format`, or `None` when the enhancer output
/// already has that format.
pub fn transcode(
    ffmpeg: &Path,
    temp: &Path,
    output: &Path,
    format: ImageFormat,
) -> Option<CommandSpec> {
    let base = CommandSpec::new(ffmpeg).arg("-y").arg("-i").path_arg(temp);
    let spec = match format {
        ImageFormat::Png => return None,
        ImageFormat::Jpg | ImageFormat::Jpeg => base.args(["-q:v", "2"]),
        ImageFormat::Webp => base.args(["-quality", "90", "-compression_level", "6"]),
    };
    Some(spec.path_arg(output))
}

/// Degraded JPEG encode at reduced resolution.
pub fn jpeg_fallback(ffmpeg: &Path, temp: &Path, output: &Path) -> CommandSpec {
    CommandSpec::new(ffmpeg)
        .arg("-y")
        .arg("-i")
        .path_arg(temp)
        .args(["-vf", JPEG_FALLBACK_SCALE, "-q:v", "2"])
        .path_arg(output)
}
