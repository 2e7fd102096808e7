//! Recording types: collections of per-sensor sequences.
//!
//! All offsets are relative to the collection's `base_timestamp` and are
//! serialized as integer milliseconds.

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A single typed measurement vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measurement {
    Doubles(Vec<f64>),
    Ints(Vec<i64>),
    Bools(Vec<bool>),
    Bytes(Vec<Vec<u8>>),
}

impl Measurement {
    /// Number of elements in the vector.
    pub fn dims(&self) -> usize {
        match self {
            Measurement::Doubles(v) => v.len(),
            Measurement::Ints(v) => v.len(),
            Measurement::Bools(v) => v.len(),
            Measurement::Bytes(v) => v.len(),
        }
    }

    /// Convenience constructor for a scalar double.
    pub fn scalar(value: f64) -> Self {
        Measurement::Doubles(vec![value])
    }
}

/// A measurement at an offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    #[serde(rename = "offset_ms", with = "duration_ms")]
    pub offset: Duration,
    pub measurement: Measurement,
}

impl Datapoint {
    pub fn new(offset: Duration, measurement: Measurement) -> Self {
        Self {
            offset,
            measurement,
        }
    }
}

/// A group of datapoints starting at `offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    #[serde(rename = "offset_ms", with = "duration_ms")]
    pub offset: Duration,
    pub datapoints: Vec<Datapoint>,
}

impl Window {
    /// Build a window from its datapoints; the window starts at the first one.
    pub fn from_datapoints(datapoints: Vec<Datapoint>) -> Self {
        let offset = datapoints.first().map(|d| d.offset).unwrap_or_default();
        Self { offset, datapoints }
    }

    pub fn len(&self) -> usize {
        self.datapoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datapoints.is_empty()
    }
}

/// Metadata describing one sensor sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceMetadata {
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub subtype: String,
    /// Elements per measurement, negative when unconstrained
    pub dimensionality: i32,
    pub windowed: bool,
    /// Datapoints per window (only meaningful when windowed)
    pub window_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_rate_hz: Option<f64>,
}

/// Storage for a sequence: raw datapoints or windows, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceData {
    Datapoints(Vec<Datapoint>),
    Windows(Vec<Window>),
}

/// Time-ordered data for one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub metadata: SequenceMetadata,
    pub data: SequenceData,
}

impl Sequence {
    /// Check the sequence against its metadata.
    pub fn validate(&self) -> Result<()> {
        let meta = &self.metadata;
        let invalid = |message: String| PipelineError::InvalidSequence {
            sensor_type: meta.sensor_type.clone(),
            subtype: meta.subtype.clone(),
            message,
        };
        let expected_dims = usize::try_from(meta.dimensionality).ok();

        match &self.data {
            SequenceData::Datapoints(points) => {
                if meta.windowed {
                    return Err(invalid("windowed sequence stores datapoints".to_string()));
                }
                check_points(points, expected_dims).map_err(invalid)?;
            }
            SequenceData::Windows(windows) => {
                if !meta.windowed {
                    return Err(invalid("unwindowed sequence stores windows".to_string()));
                }
                let mut last: Option<Duration> = None;
                for window in windows {
                    if window.len() != meta.window_size as usize {
                        return Err(invalid(format!(
                            "window at {}ms has {} datapoints, expected {}",
                            window.offset.as_millis(),
                            window.len(),
                            meta.window_size
                        )));
                    }
                    if last.is_some_and(|prev| window.offset < prev) {
                        return Err(invalid(format!(
                            "window offset {}ms goes backwards",
                            window.offset.as_millis()
                        )));
                    }
                    last = Some(window.offset);
                    check_points(&window.datapoints, expected_dims).map_err(invalid)?;
                }
            }
        }
        Ok(())
    }

    /// Total number of datapoints, across windows if windowed.
    pub fn datapoint_count(&self) -> usize {
        match &self.data {
            SequenceData::Datapoints(points) => points.len(),
            SequenceData::Windows(windows) => windows.iter().map(Window::len).sum(),
        }
    }
}

fn check_points(
    points: &[Datapoint],
    expected_dims: Option<usize>,
) -> std::result::Result<(), String> {
    let mut last: Option<Duration> = None;
    for point in points {
        if last.is_some_and(|prev| point.offset < prev) {
            return Err(format!(
                "datapoint offset {}ms goes backwards",
                point.offset.as_millis()
            ));
        }
        last = Some(point.offset);
        if let Some(dims) = expected_dims {
            if point.measurement.dims() != dims {
                return Err(format!(
                    "datapoint at {}ms has {} elements, expected {}",
                    point.offset.as_millis(),
                    point.measurement.dims(),
                    dims
                ));
            }
        }
    }
    Ok(())
}

/// Session-level metadata for a recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingCollectionMetadata {
    pub base_timestamp: DateTime<Utc>,
    pub session_id: String,
    pub user_id: String,
    #[serde(default)]
    pub device_metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub collection_metadata: BTreeMap<String, String>,
}

/// All sensor data for one recording session (a trace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingCollection {
    pub metadata: RecordingCollectionMetadata,
    pub sequences: Vec<Sequence>,
}

impl RecordingCollection {
    /// Validate every sequence.
    pub fn validate(&self) -> Result<()> {
        self.sequences.iter().try_for_each(Sequence::validate)
    }

    /// Wall-clock time of an offset.
    pub fn absolute_time(&self, offset: Duration) -> DateTime<Utc> {
        self.metadata.base_timestamp + chrono::Duration::milliseconds(offset.as_millis() as i64)
    }

    /// Find the sequence for a sensor type/subtype.
    pub fn sequence(&self, sensor_type: &str, subtype: &str) -> Option<&Sequence> {
        self.sequences
            .iter()
            .find(|s| s.metadata.sensor_type == sensor_type && s.metadata.subtype == subtype)
    }
}

/// A sample as it arrives from capture, before resolution and windowing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    #[serde(rename = "offset_ms", with = "duration_ms")]
    pub offset: Duration,
    #[serde(default)]
    pub value: Option<Measurement>,
}

impl RawSample {
    pub fn new(offset: Duration, value: Measurement) -> Self {
        Self {
            offset,
            value: Some(value),
        }
    }

    pub fn missing(offset: Duration) -> Self {
        Self {
            offset,
            value: None,
        }
    }
}

/// Raw samples from one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSensorStream {
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub subtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_rate_hz: Option<f64>,
    pub samples: Vec<RawSample>,
}

/// A recording before processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecording {
    pub metadata: RecordingCollectionMetadata,
    pub streams: Vec<RawSensorStream>,
}

/// Serde support for offsets as integer milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serialize, Serializer};
        use std::time::Duration;

        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            duration
                .map(|d| d.as_millis() as u64)
                .serialize(serializer)
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let millis = Option::<u64>::deserialize(deserializer)?;
            Ok(millis.map(Duration::from_millis))
        }
    }
}
