//! Configuration for the recording pipeline.

use crate::core::duplicates::DuplicateTimestampStrategy;
use crate::core::options::SensorOptionsTable;
use crate::core::trigger::FilterDetails;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Per-sensor windowing and validation options
    #[serde(default)]
    pub sensor_options: SensorOptionsTable,

    /// Prediction-to-trigger filter settings
    #[serde(default)]
    pub filter: FilterDetails,

    /// Pipeline-wide policies
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Path for persisted statistics
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sensor_options: SensorOptionsTable::default(),
            filter: FilterDetails::default(),
            pipeline: PipelineConfig::default(),
            data_path: default_data_path(),
        }
    }
}

fn default_data_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("recording-triggers")
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a file, falling back to defaults when it is absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a file.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("recording-triggers")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io {
            path: self.data_path.clone(),
            source: e,
        })
    }

    /// Path of the persisted statistics file.
    pub fn stats_path(&self) -> PathBuf {
        self.data_path.join("stats.json")
    }
}

/// Pipeline-wide policies that are not tied to one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Strategy used when a sensor's options leave it unset
    pub default_duplicate_strategy: DuplicateTimestampStrategy,
    /// What to do with a trailing partial window
    pub partial_window_policy: PartialWindowPolicy,
    pub strictness: Strictness,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_duplicate_strategy: DuplicateTimestampStrategy::RaiseError,
            partial_window_policy: PartialWindowPolicy::Buffer,
            strictness: Strictness::default(),
        }
    }
}

/// Handling of a trailing group shorter than `window_dims`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialWindowPolicy {
    /// Keep the datapoints pending for the next flush
    Buffer,
    /// Fail with an incomplete-window error
    Error,
}

/// Whether a bad item aborts its stream or is skipped and counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemPolicy {
    Abort,
    Skip,
}

/// Per-item error policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Strictness {
    pub dimension_mismatch: ItemPolicy,
    pub malformed_prediction: ItemPolicy,
    pub missing_value: ItemPolicy,
}

impl Default for Strictness {
    fn default() -> Self {
        Self {
            dimension_mismatch: ItemPolicy::Abort,
            malformed_prediction: ItemPolicy::Skip,
            missing_value: ItemPolicy::Skip,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Parse error in {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Serialize error: {0}")]
    Serialize(serde_json::Error),
}
