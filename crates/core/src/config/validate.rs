use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Poll interval, stall timeout and probe timeout are not 0
/// - Default scale is 2, 3 or 4
/// - Default model names are not empty
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let video = &config.video;

    if video.poll_interval_ms == 0 {
        return Err(ConfigError::invalid("video.poll_interval_ms", "must be at least 1"));
    }
    if video.stall_timeout_secs == 0 {
        return Err(ConfigError::invalid(
            "video.stall_timeout_secs",
            "a zero timeout would abort every enhancement",
        ));
    }
    if video.probe_timeout_secs == 0 {
        return Err(ConfigError::invalid("video.probe_timeout_secs", "must be at least 1"));
    }
    if !(2..=4).contains(&video.default_scale) {
        return Err(ConfigError::invalid(
            "video.default_scale",
            format!("the enhancer scales by 2, 3 or 4, not {}", video.default_scale),
        ));
    }

    if video.default_model.trim().is_empty() {
        return Err(ConfigError::invalid("video.default_model", "a model name is required"));
    }
    if config.image.default_model.trim().is_empty() {
        return Err(ConfigError::invalid("image.default_model", "a model name is required"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ImageConfig, VideoConfig};

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_interval_fails() {
        let config = Config {
            video: VideoConfig {
                poll_interval_ms: 0,
                ..VideoConfig::default()
            },
            ..Config::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "video.poll_interval_ms",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_scale_out_of_range_fails() {
        for scale in [0, 1, 5] {
            let config = Config {
                video: VideoConfig {
                    default_scale: scale,
                    ..VideoConfig::default()
                },
                ..Config::default()
            };
            let err = validate_config(&config).unwrap_err();
            assert!(err.to_string().contains(&format!("not {scale}")), "{err}");
        }
    }

    #[test]
    fn test_validate_empty_model_fails() {
        let config = Config {
            image: ImageConfig {
                default_model: "  ".to_string(),
                ..ImageConfig::default()
            },
            ..Config::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid value for `image.default_model`: a model name is required"
        );
    }
}
