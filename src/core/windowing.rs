//! Window assembly for resolved sensor streams.
//!
//! Consecutive datapoints are grouped into windows of exactly `window_dims`
//! datapoints. A trailing partial group is either kept pending or reported,
//! depending on [`PartialWindowPolicy`].

use crate::config::{ItemPolicy, PartialWindowPolicy, PipelineConfig, Strictness};
use crate::core::options::{check_measurement_dims, RecordingCollectionSensorOptions};
use crate::error::{PipelineError, Result};
use crate::recording::{Datapoint, Measurement, RawSample, SequenceData, Window};
use crate::stats::{Counter, SharedStats};
use std::time::Duration;

/// Everything an assembler produced once its input ended.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledData {
    /// Windows, or plain datapoints when windowing is disabled
    pub data: SequenceData,
    /// Datapoints of an unfinished window carried over under `Buffer`
    pub pending: Vec<Datapoint>,
}

/// Groups a stream of samples into fixed-size windows.
pub struct WindowAssembler {
    sensor_type: String,
    subtype: String,
    required_dims: i32,
    /// Datapoints per window; 0 means datapoints are passed through unwindowed
    window_dims: usize,
    default_value: Option<Measurement>,
    partial_policy: PartialWindowPolicy,
    strictness: Strictness,
    stats: SharedStats,
    /// Current window being filled
    current: Vec<Datapoint>,
    /// Completed windows ready for collection
    completed_windows: Vec<Window>,
    /// Accepted datapoints when windowing is disabled
    completed_datapoints: Vec<Datapoint>,
    last_offset: Option<Duration>,
    started: bool,
}

impl WindowAssembler {
    pub fn new(
        options: &RecordingCollectionSensorOptions,
        config: &PipelineConfig,
        stats: SharedStats,
    ) -> Self {
        Self {
            sensor_type: options.sensor_type.clone(),
            subtype: options.subtype.clone(),
            required_dims: options.required_dims,
            window_dims: options.window_dims as usize,
            default_value: options.default_value.clone(),
            partial_policy: config.partial_window_policy,
            strictness: config.strictness,
            stats,
            current: Vec::new(),
            completed_windows: Vec::new(),
            completed_datapoints: Vec::new(),
            last_offset: None,
            started: false,
        }
    }

    /// Process the next resolved sample.
    ///
    /// This will:
    /// 1. Reject offsets that are not strictly increasing
    /// 2. Seed the stream with the default value if the first value is absent
    /// 3. Check dimensionality
    /// 4. Complete a window when it reaches `window_dims` datapoints
    pub fn push(&mut self, sample: RawSample) -> Result<()> {
        let offset = sample.offset;
        match self.last_offset {
            Some(previous) if offset < previous => {
                return Err(PipelineError::OutOfOrder { previous, offset });
            }
            Some(previous) if offset == previous => {
                return Err(PipelineError::DuplicateTimestamp { offset });
            }
            _ => {}
        }
        self.last_offset = Some(offset);
        self.stats.record(Counter::SamplesSeen);

        let is_first = !self.started;
        self.started = true;

        let measurement = match sample.value {
            Some(value) => value,
            None => match (&self.default_value, is_first) {
                (Some(default), true) => {
                    tracing::debug!(
                        sensor = %self.sensor_type,
                        subtype = %self.subtype,
                        "Seeding stream with default value"
                    );
                    self.stats.record(Counter::ValuesSeeded);
                    default.clone()
                }
                _ => return self.on_missing_value(offset),
            },
        };

        if let Err(e) = check_measurement_dims(offset, &measurement, self.required_dims) {
            return match self.strictness.dimension_mismatch {
                ItemPolicy::Abort => Err(e),
                ItemPolicy::Skip => {
                    tracing::warn!(
                        sensor = %self.sensor_type,
                        subtype = %self.subtype,
                        "Skipping datapoint: {e}"
                    );
                    self.stats.record(Counter::DimensionMismatchesSkipped);
                    Ok(())
                }
            };
        }

        let datapoint = Datapoint::new(offset, measurement);
        if self.window_dims == 0 {
            self.completed_datapoints.push(datapoint);
            return Ok(());
        }

        self.current.push(datapoint);
        if self.current.len() == self.window_dims {
            self.complete_current_window();
        }
        Ok(())
    }

    fn on_missing_value(&self, offset: Duration) -> Result<()> {
        match self.strictness.missing_value {
            ItemPolicy::Abort => Err(PipelineError::MissingValue { offset }),
            ItemPolicy::Skip => {
                tracing::warn!(
                    sensor = %self.sensor_type,
                    subtype = %self.subtype,
                    offset_ms = offset.as_millis() as u64,
                    "Skipping sample without a value"
                );
                self.stats.record(Counter::MissingValuesSkipped);
                Ok(())
            }
        }
    }

    /// Apply the partial-window policy to the window being filled.
    ///
    /// Under `Buffer` the partial window stays pending and later samples keep
    /// filling it. Under `Error` a non-empty partial window fails.
    pub fn flush(&mut self) -> Result<()> {
        if self.current.is_empty() {
            return Ok(());
        }
        match self.partial_policy {
            PartialWindowPolicy::Buffer => {
                tracing::debug!(
                    sensor = %self.sensor_type,
                    subtype = %self.subtype,
                    pending = self.current.len(),
                    "Keeping partial window pending"
                );
                Ok(())
            }
            PartialWindowPolicy::Error => Err(PipelineError::IncompleteWindow {
                expected: self.window_dims,
                actual: self.current.len(),
            }),
        }
    }

    /// End the stream, returning everything produced plus any pending datapoints.
    pub fn finish(mut self) -> Result<AssembledData> {
        self.flush()?;
        let data = if self.window_dims == 0 {
            SequenceData::Datapoints(std::mem::take(&mut self.completed_datapoints))
        } else {
            SequenceData::Windows(std::mem::take(&mut self.completed_windows))
        };
        Ok(AssembledData {
            data,
            pending: std::mem::take(&mut self.current),
        })
    }

    /// Get and remove completed windows.
    pub fn take_completed_windows(&mut self) -> Vec<Window> {
        std::mem::take(&mut self.completed_windows)
    }

    /// Get and remove accepted datapoints (unwindowed streams).
    pub fn take_completed_datapoints(&mut self) -> Vec<Datapoint> {
        std::mem::take(&mut self.completed_datapoints)
    }

    pub fn has_completed_windows(&self) -> bool {
        !self.completed_windows.is_empty()
    }

    pub fn completed_window_count(&self) -> usize {
        self.completed_windows.len()
    }

    /// Datapoints of the window currently being filled.
    pub fn pending(&self) -> &[Datapoint] {
        &self.current
    }

    fn complete_current_window(&mut self) {
        let datapoints = std::mem::take(&mut self.current);
        self.completed_windows.push(Window::from_datapoints(datapoints));
        self.stats.record(Counter::WindowsEmitted);
    }
}
