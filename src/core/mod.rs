//! Core streaming engine.
//!
//! This module contains:
//! - Duplicate-timestamp resolution for raw sensor streams
//! - Sensor options lookup and dimensionality checks
//! - Window assembly for resolved streams
//! - The prediction-to-trigger filter and annotation builder
//! - Per-recording orchestration across worker threads

pub mod annotate;
pub mod duplicates;
pub mod options;
pub mod pipeline;
pub mod trigger;
pub mod windowing;

#[cfg(test)]
mod proptest;

// Re-export commonly used types
pub use annotate::{TriggerAnnotator, PRODUCER_NAME};
pub use duplicates::{
    resolve_duplicates, DuplicateResolver, DuplicateTimestampStrategy, Resolution, Timestamped,
};
pub use options::{check_dims, RecordingCollectionSensorOptions, SensorOptionsTable};
pub use pipeline::{
    annotate_recording, assemble_sequence, process_recording, AssembledSequence,
    MODEL_TRIGGERS_GROUP,
};
pub use trigger::{
    FilterDetails, FilterEvent, FilterState, PredictionToTriggerFilter, ScoredPrediction, Trigger,
    TriggerFilter,
};
pub use windowing::{AssembledData, WindowAssembler};
