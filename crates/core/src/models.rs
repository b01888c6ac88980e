//! Known enhancer models.

use tracing::warn;

/// Models offered for still images, default first.
pub const IMAGE_MODELS: &[&str] = &[
    "realesrgan-x4plus-anime",
    "realesrgan-x4plus",
    "realesr-animevideov3-x2",
    "realesr-animevideov3-x3",
    "realesr-animevideov3-x4",
];

/// Models offered for video, default first.
pub const VIDEO_MODELS: &[&str] = &[
    "realesr-animevideov3-x2",
    "realesr-animevideov3-x3",
    "realesr-animevideov3-x4",
    "realesrgan-x4plus-anime",
    "realesrgan-x4plus",
];

pub const DEFAULT_IMAGE_MODEL: &str = "realesrgan-x4plus-anime";
pub const DEFAULT_VIDEO_MODEL: &str = "realesr-animevideov3-x2";

/// Whether `name` is one of the bundled models.
pub fn is_known_model(name: &str) -> bool {
    IMAGE_MODELS.contains(&name) || VIDEO_MODELS.contains(&name)
}

/// Unknown names are passed through to the enhancer, which has the final say.
pub(crate) fn warn_if_unknown(name: &str) {
    if !is_known_model(name) {
        warn!(model = name, "Unknown model name, passing it to the enhancer as-is");
    }
}
