//! Property-based tests for the streaming engine.
//!
//! These tests use proptest to verify:
//! - Duplicate resolution is a no-op on duplicate-free streams
//! - Filter setup rejects more matching labels than window slots
//! - Windowing groups `window_dims * k` samples into `k` ordered windows
//! - No trigger fires before the previous one's budget and cooldown elapse

#![cfg(test)]

use proptest::prelude::*;
use std::time::Duration;

use crate::config::{ItemPolicy, PipelineConfig};
use crate::core::duplicates::{resolve_duplicates, DuplicateTimestampStrategy};
use crate::core::options::RecordingCollectionSensorOptions;
use crate::core::trigger::{FilterDetails, FilterEvent, PredictionToTriggerFilter, TriggerFilter};
use crate::core::windowing::WindowAssembler;
use crate::error::PipelineError;
use crate::recording::{Measurement, Prediction, RawSample, SequenceData};
use crate::stats::create_shared_stats;

// =============================================================================
// Arbitrary Generators
// =============================================================================

prop_compose! {
    /// Strictly increasing offsets built from positive gaps.
    fn arb_offsets(max_len: usize)(
        gaps in prop::collection::vec(1u64..50, 0..max_len),
    ) -> Vec<Duration> {
        gaps.iter()
            .scan(0u64, |acc, gap| {
                *acc += gap;
                Some(Duration::from_millis(*acc))
            })
            .collect()
    }
}

prop_compose! {
    fn arb_samples(max_len: usize)(
        offsets in arb_offsets(max_len),
        value in any::<i64>(),
    ) -> Vec<RawSample> {
        offsets
            .into_iter()
            .enumerate()
            .map(|(i, offset)| {
                RawSample::new(offset, Measurement::Ints(vec![value.wrapping_add(i as i64)]))
            })
            .collect()
    }
}

prop_compose! {
    fn arb_prediction_window()(
        n in 0u32..10,
        extra in 1u32..10,
    ) -> PredictionToTriggerFilter {
        PredictionToTriggerFilter {
            num_consecutive_predictions: n,
            num_matching_labels: n + extra,
        }
    }
}

prop_compose! {
    fn arb_filter_details()(
        n in 1u32..5,
        m_seed in any::<u32>(),
        budget in 0i32..4,
        cooldown_ms in 0u64..500,
    ) -> FilterDetails {
        FilterDetails {
            prediction_to_trigger_filter: PredictionToTriggerFilter {
                num_consecutive_predictions: n,
                num_matching_labels: 1 + m_seed % n,
            },
            num_inferences_per_invocation: budget,
            cooldown_period_ms: cooldown_ms,
            ..FilterDetails::default()
        }
    }
}

prop_compose! {
    fn arb_predictions(max_len: usize)(
        offsets in arb_offsets(max_len),
        labels in prop::collection::vec(prop::sample::select(vec!["A", "B", "C"]), max_len),
        confidences in prop::collection::vec(0.0f64..=1.0, max_len),
    ) -> Vec<Prediction> {
        offsets
            .into_iter()
            .zip(labels)
            .zip(confidences)
            .map(|((offset, label), confidence)| Prediction::new(offset, label, confidence))
            .collect()
    }
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn resolution_is_identity_without_duplicates(samples in arb_samples(64)) {
        for strategy in [
            DuplicateTimestampStrategy::RaiseError,
            DuplicateTimestampStrategy::KeepLastValue,
        ] {
            let resolution = resolve_duplicates(samples.clone(), strategy).unwrap();
            prop_assert_eq!(&resolution.items, &samples);
            prop_assert_eq!(resolution.duplicates_dropped, 0);
        }
    }

    #[test]
    fn too_many_matching_labels_rejected(window in arb_prediction_window()) {
        let details = FilterDetails {
            prediction_to_trigger_filter: window,
            ..FilterDetails::default()
        };
        let result = TriggerFilter::new(details, ItemPolicy::Skip, create_shared_stats());
        let is_invalid_config = matches!(result, Err(PipelineError::InvalidFilterConfig { .. }));
        prop_assert!(is_invalid_config);
    }

    #[test]
    fn windowing_groups_in_order(window_dims in 1u32..8, k in 0usize..8) {
        let options = RecordingCollectionSensorOptions {
            required_dims: 1,
            window_dims,
            ..RecordingCollectionSensorOptions::new("accel", "wrist")
        };
        let mut assembler =
            WindowAssembler::new(&options, &PipelineConfig::default(), create_shared_stats());
        let total = window_dims as usize * k;
        for i in 0..total {
            let sample = RawSample::new(
                Duration::from_millis(i as u64),
                Measurement::Ints(vec![i as i64]),
            );
            assembler.push(sample).unwrap();
        }

        let output = assembler.finish().unwrap();
        prop_assert!(output.pending.is_empty());
        let SequenceData::Windows(windows) = output.data else {
            return Err(TestCaseError::fail("expected windows"));
        };
        prop_assert_eq!(windows.len(), k);

        let flattened: Vec<Measurement> = windows
            .iter()
            .flat_map(|w| {
                assert_eq!(w.len(), window_dims as usize);
                w.datapoints.iter().map(|d| d.measurement.clone())
            })
            .collect();
        let expected: Vec<Measurement> =
            (0..total).map(|i| Measurement::Ints(vec![i as i64])).collect();
        prop_assert_eq!(flattened, expected);
    }

    #[test]
    fn triggers_respect_budget_and_cooldown(
        details in arb_filter_details(),
        predictions in arb_predictions(64),
    ) {
        let cooldown = details.cooldown_period();
        let budget = details.inference_budget();
        let mut filter =
            TriggerFilter::new(details, ItemPolicy::Skip, create_shared_stats()).unwrap();

        // Offsets of every prediction after each trigger
        let mut last_trigger: Option<Duration> = None;
        let mut seen_since_trigger: Vec<Duration> = Vec::new();

        for prediction in predictions {
            let offset = prediction.offset;
            let event = filter.observe(prediction).unwrap();

            if let Some(FilterEvent::Triggered(trigger)) = event {
                if let Some(previous) = last_trigger {
                    // A second trigger needs a finite budget, fully spent
                    let budget = budget.expect("unlimited budget never re-triggers") as usize;
                    prop_assert!(seen_since_trigger.len() >= budget);
                    let budget_end = seen_since_trigger[budget - 1];
                    prop_assert!(previous <= budget_end);
                    prop_assert!(trigger.offset >= budget_end + cooldown);
                }
                last_trigger = Some(trigger.offset);
                seen_since_trigger.clear();
            } else if last_trigger.is_some() {
                seen_since_trigger.push(offset);
            }
        }
    }
}
