//! Configuration for the Speedcam Sentinel agent.

use crate::capability::DEFAULT_VIBRATION_PATTERN_MS;
use crate::core::{
    SelectionPolicy, Thresholds, DEFAULT_ANGLE_TOLERANCE_DEGREES, DEFAULT_RADIUS_METERS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Trigger thresholds and alert outputs
    pub alert: AlertConfig,

    /// Camera catalog: a file path or an http(s) URL
    pub catalog: String,

    /// Path for storing state and statistics
    pub data_path: PathBuf,

    /// Whether to keep the display awake while tracking
    pub wake_lock: bool,

    /// Delay between samples when replaying a recorded track
    pub replay_interval_ms: u64,

    /// Whether tracking is currently paused
    pub paused: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("speedcam-sentinel");

        Self {
            alert: AlertConfig::default(),
            catalog: data_dir.join("cameras.json").to_string_lossy().into_owned(),
            data_path: data_dir,
            wake_lock: true,
            replay_interval_ms: 1000,
            paused: false,
        }
    }
}

/// When and how alerts fire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub radius_meters: f64,
    pub angle_tolerance_degrees: f64,
    pub selection: SelectionPolicy,
    pub vibration_pattern_ms: Vec<u64>,
    /// External player argv, e.g. `["paplay", "alert.wav"]`; the terminal
    /// bell is used when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound_command: Option<Vec<String>>,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            radius_meters: DEFAULT_RADIUS_METERS,
            angle_tolerance_degrees: DEFAULT_ANGLE_TOLERANCE_DEGREES,
            selection: SelectionPolicy::FirstMatch,
            vibration_pattern_ms: DEFAULT_VIBRATION_PATTERN_MS.to_vec(),
            sound_command: None,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("speedcam-sentinel")
            .join("config.json")
    }

    /// Where session statistics are persisted.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|source| ConfigError::Io {
            path: self.data_path.clone(),
            source,
        })
    }

    /// Reject thresholds the evaluator cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let radius = self.alert.radius_meters;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "alert.radius_meters must be a positive number, got {radius}"
            )));
        }
        let tolerance = self.alert.angle_tolerance_degrees;
        if !(0.0..=180.0).contains(&tolerance) {
            return Err(ConfigError::Invalid(format!(
                "alert.angle_tolerance_degrees must be within 0..=180, got {tolerance}"
            )));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            radius_meters: self.alert.radius_meters,
            angle_tolerance_degrees: self.alert.angle_tolerance_degrees,
            selection: self.alert.selection,
        }
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_millis(self.replay_interval_ms)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Serialize error: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.alert.radius_meters, 204.0);
        assert_eq!(config.alert.angle_tolerance_degrees, 45.0);
        assert_eq!(config.alert.vibration_pattern_ms, vec![200, 100, 200]);
        assert_eq!(config.alert.selection, SelectionPolicy::FirstMatch);
        assert!(config.wake_lock);
        assert!(!config.paused);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg").join("config.json");

        let mut config = Config::default();
        config.paused = true;
        config.alert.selection = SelectionPolicy::Nearest;
        config.alert.sound_command = Some(vec!["paplay".to_string(), "beep.wav".to_string()]);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"alert": {"radius_meters": 300.0}, "paused": true}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.alert.radius_meters, 300.0);
        assert_eq!(config.alert.angle_tolerance_degrees, 45.0);
        assert!(config.paused);
        assert!(config.wake_lock);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let mut config = Config::default();
        config.alert.radius_meters = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.alert.radius_meters = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.alert.radius_meters = 204.0;
        config.alert.angle_tolerance_degrees = 181.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_garbage_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_thresholds_from_config() {
        let mut config = Config::default();
        config.alert.radius_meters = 150.0;
        let thresholds = config.thresholds();
        assert_eq!(thresholds.radius_meters, 150.0);
        assert_eq!(thresholds.angle_tolerance_degrees, 45.0);
    }
}
