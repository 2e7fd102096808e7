//! Builds annotations from trigger-filter output.
//!
//! Each annotation is stamped with producer metadata so model-generated
//! labels can be told apart from ground truth.

use crate::config::ItemPolicy;
use crate::core::trigger::{FilterDetails, FilterEvent, TriggerFilter};
use crate::error::Result;
use crate::recording::{
    Annotation, AnnotationSequence, AnnotationSequenceMetadata, Label, PredictionStream,
};
use crate::stats::SharedStats;
use std::collections::BTreeMap;
use uuid::Uuid;

/// The name of this producer.
pub const PRODUCER_NAME: &str = "recording-triggers";

/// Reference keys written into every generated annotation.
pub const REF_PRODUCER: &str = "producer";
pub const REF_PRODUCER_VERSION: &str = "producer_version";
pub const REF_INSTANCE_ID: &str = "instance_id";
pub const REF_MODEL: &str = "model";
pub const REF_KIND: &str = "kind";
pub const REF_MATCHES: &str = "matches";

/// Turns filter events into annotations.
pub struct TriggerAnnotator {
    instance_id: Uuid,
}

impl TriggerAnnotator {
    /// Create a new annotator with a unique instance ID.
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4(),
        }
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Annotation for an event, if the event produces one.
    ///
    /// Triggers and max-confidence selections become point annotations.
    /// In-budget inferences after a trigger do not.
    pub fn annotation_for(&self, event: &FilterEvent, model: &str) -> Option<Annotation> {
        let (offset, label, kind, matches) = match event {
            FilterEvent::Triggered(trigger) => (
                trigger.offset,
                Label {
                    name: trigger.label.clone(),
                    id: trigger.label_id,
                    confidence: Some(trigger.confidence),
                },
                "trigger",
                Some(trigger.matches),
            ),
            FilterEvent::Selected(selected) => (
                selected.offset,
                Label {
                    name: selected.label.clone(),
                    id: selected.label_id,
                    confidence: Some(selected.confidence),
                },
                "selection",
                None,
            ),
            FilterEvent::Inference(_) => return None,
        };

        let mut annotation = Annotation::point(offset, label);
        annotation.references = self.references(model, kind, matches);
        Some(annotation)
    }

    fn references(&self, model: &str, kind: &str, matches: Option<usize>) -> BTreeMap<String, String> {
        let mut references = BTreeMap::new();
        references.insert(REF_PRODUCER.to_string(), PRODUCER_NAME.to_string());
        references.insert(
            REF_PRODUCER_VERSION.to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        references.insert(REF_INSTANCE_ID.to_string(), self.instance_id.to_string());
        references.insert(REF_MODEL.to_string(), model.to_string());
        references.insert(REF_KIND.to_string(), kind.to_string());
        if let Some(matches) = matches {
            references.insert(REF_MATCHES.to_string(), matches.to_string());
        }
        references
    }

    /// Run a fresh filter over one prediction stream.
    pub fn annotate_stream(
        &self,
        stream: PredictionStream,
        details: &FilterDetails,
        malformed_policy: ItemPolicy,
        stats: SharedStats,
    ) -> Result<AnnotationSequence> {
        let mut filter = TriggerFilter::new(details.clone(), malformed_policy, stats)?;
        let mut sequence = AnnotationSequence::new(AnnotationSequenceMetadata {
            sensor_type: stream.sensor_type.clone(),
            subtype: stream.subtype.clone(),
            source: stream.model.clone(),
        });

        for prediction in stream.predictions {
            if let Some(event) = filter.observe(prediction)? {
                if let Some(annotation) = self.annotation_for(&event, &stream.model) {
                    sequence.push(annotation)?;
                }
            }
        }
        if let Some(event) = filter.finish() {
            if let Some(annotation) = self.annotation_for(&event, &stream.model) {
                sequence.push(annotation)?;
            }
        }
        sequence.record_analyses(filter.analyses_executed());

        tracing::info!(
            sensor = %stream.sensor_type,
            subtype = %stream.subtype,
            model = %stream.model,
            annotations = sequence.len(),
            analyses = sequence.analyses_executed(),
            "Prediction stream filtered"
        );
        Ok(sequence)
    }
}

impl Default for TriggerAnnotator {
    fn default() -> Self {
        Self::new()
    }
}
