//! Error types for the recording pipeline.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while resolving, windowing or filtering a stream.
///
/// Setup-time variants (`InvalidFilterConfig`, `InvalidSensorOptions`,
/// `SensorOptionsNotFound`) abort pipeline construction. The remaining
/// variants abort the stream that produced them.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    /// Two values share an offset and the strategy is `RaiseError`.
    #[error("duplicate timestamp at offset {}ms", .offset.as_millis())]
    DuplicateTimestamp { offset: Duration },

    /// Offsets went backwards.
    #[error("out-of-order offset {}ms after {}ms", .offset.as_millis(), .previous.as_millis())]
    OutOfOrder { previous: Duration, offset: Duration },

    /// A measurement vector has the wrong number of elements.
    #[error("dimension mismatch at offset {}ms: expected {expected}, got {actual}", .offset.as_millis())]
    DimensionMismatch {
        offset: Duration,
        expected: usize,
        actual: usize,
    },

    /// A stream ended with a partial window and partial windows are not allowed.
    #[error("incomplete final window: expected {expected} datapoints, got {actual}")]
    IncompleteWindow { expected: usize, actual: usize },

    /// No options entry for a sensor type/subtype.
    #[error("no sensor options for type '{sensor_type}' subtype '{subtype}'")]
    SensorOptionsNotFound { sensor_type: String, subtype: String },

    /// The sensor options table itself is inconsistent.
    #[error("invalid sensor options: {message}")]
    InvalidSensorOptions { message: String },

    /// Filter configuration rejected at setup.
    #[error("invalid filter config: {message}")]
    InvalidFilterConfig { message: String },

    /// A prediction without a usable label or confidence, under the abort policy.
    #[error("malformed prediction at offset {}ms: {reason}", .offset.as_millis())]
    MalformedPrediction { offset: Duration, reason: String },

    /// A measurement value was absent, under the abort policy.
    #[error("missing measurement at offset {}ms", .offset.as_millis())]
    MissingValue { offset: Duration },

    /// A sequence violates its own metadata.
    #[error("invalid sequence '{sensor_type}/{subtype}': {message}")]
    InvalidSequence {
        sensor_type: String,
        subtype: String,
        message: String,
    },

    /// An annotation would break start-time ordering.
    #[error("annotation at {}ms precedes previous start {}ms", .start.as_millis(), .previous.as_millis())]
    UnsortedAnnotation { previous: Duration, start: Duration },

    /// An interval annotation ends before it starts.
    #[error("annotation ends at {}ms before its start {}ms", .end.as_millis(), .start.as_millis())]
    InvalidInterval { start: Duration, end: Duration },
}

impl PipelineError {
    /// Returns true if the error was raised while setting up a pipeline,
    /// before any stream data was consumed.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidFilterConfig { .. }
                | PipelineError::InvalidSensorOptions { .. }
                | PipelineError::SensorOptionsNotFound { .. }
        )
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_error_classification() {
        let err = PipelineError::InvalidFilterConfig {
            message: "bad".to_string(),
        };
        assert!(err.is_setup_error());

        let err = PipelineError::DuplicateTimestamp {
            offset: Duration::from_millis(5),
        };
        assert!(!err.is_setup_error());
    }

    #[test]
    fn test_error_messages_carry_offsets() {
        let err = PipelineError::DimensionMismatch {
            offset: Duration::from_millis(40),
            expected: 3,
            actual: 2,
        };
        let text = err.to_string();
        assert!(text.contains("40ms"));
        assert!(text.contains("expected 3, got 2"));
    }
}
