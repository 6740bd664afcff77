use std::path::{Path, PathBuf};
use std::time::Duration;

use gravy_render::{CameraConfig, LightingConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Engine settings. Every field is optional in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Paint cadence of the render loop, in seconds.
    #[serde(with = "secs")]
    pub render_interval: Duration,
    /// Fixed wall-clock interval of the simulation loop, in seconds.
    #[serde(with = "secs")]
    pub simulation_interval: Duration,
    /// Window the framerate counter averages over, in seconds.
    #[serde(with = "secs")]
    pub framerate_window: Duration,
    pub camera: CameraConfig,
    pub lighting: LightingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            render_interval: Duration::from_secs_f64(1.0 / 60.0),
            simulation_interval: Duration::from_secs_f64(1.0 / 120.0),
            framerate_window: Duration::from_secs(1),
            camera: CameraConfig::default(),
            lighting: LightingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("render_interval", self.render_interval),
            ("simulation_interval", self.simulation_interval),
            ("framerate_window", self.framerate_window),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        let camera = &self.camera;
        if !(camera.near > 0.0 && camera.far > camera.near) {
            return Err(ConfigError::Invalid(format!(
                "camera clip range {}..{} is empty",
                camera.near, camera.far
            )));
        }
        if !(camera.fov_degrees > 0.0 && camera.fov_degrees < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "camera fov {} out of range",
                camera.fov_degrees
            )));
        }
        Ok(())
    }
}

/// `Duration` as fractional seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}
