//! Recording and annotation data model.
//!
//! These are plain value records produced upstream (capture and inference)
//! and read by the core pipeline.

pub mod annotation;
pub mod types;

// Re-export commonly used types
pub use annotation::{
    AnnotatedRecordingCollection, Annotation, AnnotationGroup, AnnotationGroupMetadata,
    AnnotationSequence, AnnotationSequenceMetadata, Label, Prediction, PredictionStream,
};
pub use types::{
    Datapoint, Measurement, RawRecording, RawSample, RawSensorStream, RecordingCollection,
    RecordingCollectionMetadata, Sequence, SequenceData, SequenceMetadata, Window,
};
