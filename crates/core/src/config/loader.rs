use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

const ENV_PREFIX: &str = "UPSCALER_";

/// Load configuration from file with environment variable overrides
///
/// Nested keys are separated by a double underscore, e.g.
/// `UPSCALER_VIDEO__STALL_TIMEOUT_SECS=60`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::Missing {
            path: path.to_path_buf(),
        });
    }

    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::Malformed(e.to_string()))
}

/// Load configuration from `path` if given, otherwise from defaults and the
/// environment only
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => load_config(path),
        None => Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::Malformed(e.to_string())),
    }
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ImageFormat;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_empty_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_config_from_str_partial() {
        let toml = r#"
[video]
stall_timeout_secs = 90
frame_format = "webp"

[image]
default_format = "png"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.video.stall_timeout_secs, 90);
        assert_eq!(config.video.frame_format, ImageFormat::Webp);
        assert_eq!(config.video.poll_interval_ms, 500);
        assert_eq!(config.image.default_format, ImageFormat::Png);
        assert_eq!(config.tools.ffmpeg, PathBuf::from("ffmpeg"));
    }

    #[test]
    fn test_load_config_from_str_bad_format() {
        let toml = r#"
[image]
default_format = "gif"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/upscaler.toml"));
        match result {
            Err(ConfigError::Missing { path }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/upscaler.toml"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[tools]
enhancer = "/opt/realesrgan/realesrgan-ncnn-vulkan"

[video]
workspace_root = "/scratch"
default_scale = 4
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(
            config.tools.enhancer,
            PathBuf::from("/opt/realesrgan/realesrgan-ncnn-vulkan")
        );
        assert_eq!(config.video.workspace_root, Some(PathBuf::from("/scratch")));
        assert_eq!(config.video.default_scale, 4);
        assert_eq!(config.tools.ffprobe, PathBuf::from("ffprobe"));
    }
}
