//! Annotation types: labeled intervals attached to a recording, and the
//! per-timestep model predictions they are derived from.

use crate::error::{PipelineError, Result};
use crate::recording::types::{duration_ms, RecordingCollection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A label attached to an annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    #[serde(default)]
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// A labeled point or half-open interval within a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "start_ms", with = "duration_ms")]
    pub start: Duration,
    #[serde(
        rename = "end_ms",
        default,
        with = "duration_ms::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub end: Option<Duration>,
    pub labels: Vec<Label>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub references: BTreeMap<String, String>,
}

impl Annotation {
    /// A point annotation carrying a single label.
    pub fn point(start: Duration, label: Label) -> Self {
        Self {
            start,
            end: None,
            labels: vec![label],
            verified: false,
            references: BTreeMap::new(),
        }
    }

    /// An interval annotation over `[start, end)` carrying a single label.
    pub fn interval(start: Duration, end: Duration, label: Label) -> Result<Self> {
        if end < start {
            return Err(PipelineError::InvalidInterval { start, end });
        }
        Ok(Self {
            end: Some(end),
            ..Self::point(start, label)
        })
    }

    /// Whether this annotation covers a single instant.
    pub fn is_point(&self) -> bool {
        self.end.is_none()
    }
}

/// Describes where a sequence of annotations came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSequenceMetadata {
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub subtype: String,
    /// Model or person that produced the annotations
    pub source: String,
}

/// Annotations sorted by start, plus inference cost accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationSequence {
    pub metadata: AnnotationSequenceMetadata,
    annotations: Vec<Annotation>,
    analyses_executed: u64,
}

impl AnnotationSequence {
    pub fn new(metadata: AnnotationSequenceMetadata) -> Self {
        Self {
            metadata,
            annotations: Vec::new(),
            analyses_executed: 0,
        }
    }

    /// Append an annotation, keeping start offsets non-decreasing.
    ///
    /// Interval annotations must not end before they start.
    pub fn push(&mut self, annotation: Annotation) -> Result<()> {
        if let Some(end) = annotation.end {
            if end < annotation.start {
                return Err(PipelineError::InvalidInterval {
                    start: annotation.start,
                    end,
                });
            }
        }
        if let Some(last) = self.annotations.last() {
            if annotation.start < last.start {
                return Err(PipelineError::UnsortedAnnotation {
                    previous: last.start,
                    start: annotation.start,
                });
            }
        }
        self.annotations.push(annotation);
        Ok(())
    }

    /// Add to the count of analyses executed. The count never decreases.
    pub fn record_analyses(&mut self, count: u64) {
        self.analyses_executed = self.analyses_executed.saturating_add(count);
    }

    pub fn analyses_executed(&self) -> u64 {
        self.analyses_executed
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}

/// Provenance or theme shared by a set of annotation sequences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationGroupMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationGroup {
    pub metadata: AnnotationGroupMetadata,
    pub sequences: Vec<AnnotationSequence>,
}

/// A recording together with its annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedRecordingCollection {
    pub recording: RecordingCollection,
    #[serde(default)]
    pub groups: Vec<AnnotationGroup>,
}

impl AnnotatedRecordingCollection {
    /// Look up a group by name.
    pub fn group(&self, name: &str) -> Option<&AnnotationGroup> {
        self.groups.iter().find(|g| g.metadata.name == name)
    }
}

/// One model output for one timestep.
///
/// Label and confidence are optional on input so malformed predictions can be
/// detected and skipped rather than failing deserialization of a whole stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    #[serde(rename = "offset_ms", with = "duration_ms")]
    pub offset: Duration,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub label_id: i64,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl Prediction {
    pub fn new(offset: Duration, label: impl Into<String>, confidence: f64) -> Self {
        Self {
            offset,
            label: Some(label.into()),
            label_id: 0,
            confidence: Some(confidence),
        }
    }
}

/// Predictions for one sensor stream from one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionStream {
    #[serde(rename = "type")]
    pub sensor_type: String,
    pub subtype: String,
    pub model: String,
    pub predictions: Vec<Prediction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn label(name: &str) -> Label {
        Label {
            name: name.to_string(),
            id: 1,
            confidence: Some(0.9),
        }
    }

    #[test]
    fn test_push_keeps_start_order() {
        let mut sequence = AnnotationSequence::default();
        sequence.push(Annotation::point(ms(10), label("walk"))).unwrap();
        sequence.push(Annotation::point(ms(10), label("run"))).unwrap();

        let err = sequence
            .push(Annotation::point(ms(5), label("sit")))
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnsortedAnnotation { .. }));
        assert_eq!(sequence.len(), 2);
    }

    #[test]
    fn test_push_rejects_interval_ending_before_start() {
        let mut sequence = AnnotationSequence::default();
        let backwards = Annotation {
            end: Some(ms(50)),
            ..Annotation::point(ms(100), label("walk"))
        };

        let err = sequence.push(backwards).unwrap_err();
        assert_eq!(
            err,
            PipelineError::InvalidInterval {
                start: ms(100),
                end: ms(50),
            }
        );
        assert!(sequence.is_empty());

        let empty = Annotation::interval(ms(100), ms(100), label("walk")).unwrap();
        sequence.push(empty).unwrap();
        assert_eq!(sequence.len(), 1);
    }

    #[test]
    fn test_interval_constructor_validates_bounds() {
        let annotation = Annotation::interval(ms(10), ms(40), label("run")).unwrap();
        assert!(!annotation.is_point());
        assert_eq!(annotation.end, Some(ms(40)));

        let err = Annotation::interval(ms(40), ms(10), label("run")).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInterval { .. }));
    }

    #[test]
    fn test_analyses_count_is_monotonic() {
        let mut sequence = AnnotationSequence::default();
        sequence.record_analyses(3);
        sequence.record_analyses(0);
        sequence.record_analyses(2);
        assert_eq!(sequence.analyses_executed(), 5);
    }

    #[test]
    fn test_prediction_missing_fields_deserialize() {
        let prediction: Prediction = serde_json::from_str(r#"{"offset_ms": 20}"#).unwrap();
        assert_eq!(prediction.offset, ms(20));
        assert!(prediction.label.is_none());
        assert!(prediction.confidence.is_none());
    }

    #[test]
    fn test_point_annotation_serialization() {
        let annotation = Annotation::point(ms(250), label("walk"));
        assert!(annotation.is_point());

        let json = serde_json::to_value(&annotation).unwrap();
        assert_eq!(json["start_ms"], 250);
        assert!(json.get("end_ms").is_none());
    }
}
