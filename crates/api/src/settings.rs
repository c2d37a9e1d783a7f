//! Layered configuration
//!
//! Defaults, then `config/drowsiness.{toml,yaml,json}` if present, then
//! environment variables such as `DROWSY__DETECTION__EAR_THRESHOLD=0.22`.

use alerting::AlertConfig;
use camera_capture::CameraConfig;
use config::{Config, ConfigError, Environment, File};
use detection::DetectionConfig;
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;
use crate::rate_limit::RateLimitConfig;

pub const DEFAULT_CONFIG_FILE: &str = "config/drowsiness";
pub const ENV_PREFIX: &str = "DROWSY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Seconds between rate limiter cleanups
    pub limiter_cleanup_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            limiter_cleanup_secs: 60,
        }
    }
}

/// Everything the binaries need
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub alert: AlertConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load with `path` (extension optional) as the file layer
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let settings = Settings::load_from("/nonexistent/drowsiness").unwrap();
        assert_eq!(settings.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(settings.detection.ear_threshold, 0.25);
        assert_eq!(settings.detection.consecutive_frames, 20);
        assert_eq!(settings.camera.width, 640);
        assert_eq!(settings.rate_limit.burst_size, 10);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("drowsy-settings-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("drowsiness.toml");
        std::fs::write(
            &path,
            "[detection]\near_threshold = 0.22\nconsecutive_frames = 30\n\n[server]\nbind_addr = \"127.0.0.1:9000\"\n",
        )
        .unwrap();

        let settings = Settings::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.detection.ear_threshold, 0.22);
        assert_eq!(settings.detection.consecutive_frames, 30);
        assert_eq!(settings.detection.frame_skip, 2);
        assert_eq!(settings.server.bind_addr, "127.0.0.1:9000");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
