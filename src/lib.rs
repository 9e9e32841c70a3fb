pub mod app;
pub mod capture;
pub mod error;
pub mod lighting;
pub mod pipeline;
pub mod server;
pub mod settings;
pub mod stream;
#[cfg(feature = "v4l2")]
pub mod utils;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use capture::{CaptureConfig, Frame};
pub use error::{Error, Result};

/// Environment variable prefix for configuration overrides (`AQUACAM__SERVER__BIND=...`)
pub const ENV_PREFIX: &str = "AQUACAM";

/// Process configuration, fixed for the lifetime of the process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub camera: CameraConfig,
    pub lighting: LightingHardwareConfig,
    pub settings: SettingsFileConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraBackend {
    TestPattern,
    V4l2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub backend: CameraBackend,
    /// Empty means auto-detect
    pub device: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightingHardwareConfig {
    pub led_count: usize,
    pub schedule_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsFileConfig {
    pub path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: if cfg!(feature = "v4l2") {
                CameraBackend::V4l2
            } else {
                CameraBackend::TestPattern
            },
            device: String::new(),
        }
    }
}

impl Default for LightingHardwareConfig {
    fn default() -> Self {
        Self {
            led_count: 30,
            schedule_interval_secs: 60,
        }
    }
}

impl Default for SettingsFileConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("camera_settings.json"),
        }
    }
}

impl LightingHardwareConfig {
    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_secs.max(1))
    }
}

impl AppConfig {
    /// Layer an optional TOML file under `AQUACAM__*` environment variables
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path.unwrap_or("aquacam")).required(path.is_some()))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_toml_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aquacam.toml");
        std::fs::write(
            &path,
            "[server]\nbind = \"127.0.0.1:9000\"\n\n[lighting]\nled_count = 12\n",
        )
        .unwrap();

        let config = AppConfig::load(path.to_str()).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.lighting.led_count, 12);
        assert_eq!(config.lighting.schedule_interval_secs, 60);
        assert_eq!(config.settings.path, PathBuf::from("camera_settings.json"));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        assert!(matches!(
            AppConfig::load(Some("/nonexistent/aquacam.toml")),
            Err(Error::Config(_))
        ));
    }
}
