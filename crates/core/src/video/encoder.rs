//! Video encoder detection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Encoders the rebuild stage can use, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoEncoder {
    Libx264,
    Mpeg4,
}

impl VideoEncoder {
    pub fn codec_args(&self) -> &'static [&'static str] {
        match self {
            Self::Libx264 => &["-c:v", "libx264", "-pix_fmt", "yuv420p"],
            Self::Mpeg4 => &["-c:v", "mpeg4", "-q:v", "2"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Libx264 => "libx264",
            Self::Mpeg4 => "mpeg4",
        }
    }
}

impl fmt::Display for VideoEncoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoders reported by `ffmpeg -encoders`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderCapabilities {
    pub libx264: bool,
}

impl EncoderCapabilities {
    /// Scans the encoder listing. Each encoder line reads
    /// ` V....D libx264   libx264 H.264 / AVC ...`.
    pub fn from_listing(listing: &str) -> Self {
        let has = |name: &str| {
            listing
                .lines()
                .any(|line| line.split_whitespace().nth(1) == Some(name))
        };
        Self {
            libx264: has("libx264"),
        }
    }

    /// libx264 when available, else the always-present mpeg4 encoder.
    pub fn preferred(&self) -> VideoEncoder {
        if self.libx264 {
            VideoEncoder::Libx264
        } else {
            VideoEncoder::Mpeg4
        }
    }
}
