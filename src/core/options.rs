//! Per-sensor options: declared dimensionality, window size, duplicate
//! handling and default values.

use crate::core::duplicates::DuplicateTimestampStrategy;
use crate::error::{PipelineError, Result};
use crate::recording::{Datapoint, Measurement};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options for one (type, subtype) sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingCollectionSensorOptions {
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub subtype: String,
    /// Elements per measurement; negative means unconstrained
    #[serde(default = "unconstrained_dims")]
    pub required_dims: i32,
    /// Datapoints per window; 0 disables windowing
    #[serde(default)]
    pub window_dims: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_timestamps_handling_strategy: Option<DuplicateTimestampStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Measurement>,
}

fn unconstrained_dims() -> i32 {
    -1
}

impl RecordingCollectionSensorOptions {
    /// Options with no constraints and no windowing.
    pub fn new(sensor_type: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            sensor_type: sensor_type.into(),
            subtype: subtype.into(),
            required_dims: unconstrained_dims(),
            window_dims: 0,
            duplicate_timestamps_handling_strategy: None,
            default_value: None,
        }
    }

    /// Required element count, if constrained.
    pub fn expected_dims(&self) -> Option<usize> {
        usize::try_from(self.required_dims).ok()
    }

    pub fn is_windowed(&self) -> bool {
        self.window_dims > 0
    }

    /// The configured strategy, or `fallback` when unset.
    pub fn duplicate_strategy(
        &self,
        fallback: DuplicateTimestampStrategy,
    ) -> DuplicateTimestampStrategy {
        self.duplicate_timestamps_handling_strategy
            .unwrap_or(fallback)
    }

    fn matches(&self, sensor_type: &str, subtype: &str) -> bool {
        self.sensor_type == sensor_type && self.subtype == subtype
    }
}

/// Check a datapoint against a required element count.
pub fn check_dims(datapoint: &Datapoint, required_dims: i32) -> Result<()> {
    check_measurement_dims(datapoint.offset, &datapoint.measurement, required_dims)
}

pub(crate) fn check_measurement_dims(
    offset: Duration,
    measurement: &Measurement,
    required_dims: i32,
) -> Result<()> {
    let Ok(expected) = usize::try_from(required_dims) else {
        return Ok(());
    };
    let actual = measurement.dims();
    if actual != expected {
        return Err(PipelineError::DimensionMismatch {
            offset,
            expected,
            actual,
        });
    }
    Ok(())
}

/// The options for all known sensors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorOptionsTable {
    entries: Vec<RecordingCollectionSensorOptions>,
}

impl SensorOptionsTable {
    pub fn new(entries: Vec<RecordingCollectionSensorOptions>) -> Self {
        Self { entries }
    }

    /// Add or replace the entry for a sensor.
    pub fn insert(&mut self, options: RecordingCollectionSensorOptions) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.matches(&options.sensor_type, &options.subtype))
        {
            Some(existing) => *existing = options,
            None => self.entries.push(options),
        }
    }

    /// Find the options for a sensor.
    pub fn lookup(
        &self,
        sensor_type: &str,
        subtype: &str,
    ) -> Result<&RecordingCollectionSensorOptions> {
        self.entries
            .iter()
            .find(|e| e.matches(sensor_type, subtype))
            .ok_or_else(|| PipelineError::SensorOptionsNotFound {
                sensor_type: sensor_type.to_string(),
                subtype: subtype.to_string(),
            })
    }

    /// Reject duplicate entries and default values that break their own dims.
    pub fn validate(&self) -> Result<()> {
        for (i, entry) in self.entries.iter().enumerate() {
            if self.entries[..i]
                .iter()
                .any(|e| e.matches(&entry.sensor_type, &entry.subtype))
            {
                return Err(PipelineError::InvalidSensorOptions {
                    message: format!(
                        "duplicate entry for '{}/{}'",
                        entry.sensor_type, entry.subtype
                    ),
                });
            }
            if let Some(ref default) = entry.default_value {
                check_measurement_dims(Duration::ZERO, default, entry.required_dims).map_err(
                    |e| PipelineError::InvalidSensorOptions {
                        message: format!(
                            "default value for '{}/{}': {e}",
                            entry.sensor_type, entry.subtype
                        ),
                    },
                )?;
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordingCollectionSensorOptions> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
