//! Prediction-to-trigger filtering.
//!
//! Turns a noisy stream of per-step `(label, confidence)` predictions into a
//! few debounced trigger events. The filter is an explicit state machine:
//!
//! ```text
//!            window has >= M matching labels
//!   ┌──────┐ ───────────────────────────────▶ ┌──────────────────┐
//!   │ Idle │                                  │ TriggeredActive  │
//!   └──────┘ ◀──────────┐                     └──────────────────┘
//!      │                │ offset >= until              │ inferences >= budget
//!      │ finish()       │                              ▼
//!      │ (threshold 0)  └──────────────────── ┌──────────────────┐
//!      ▼                                      │    Cooldown      │
//!   ┌──────────┐                              └──────────────────┘
//!   │ Selected │
//!   └──────────┘
//! ```
//!
//! One filter instance belongs to exactly one prediction stream.

use crate::config::ItemPolicy;
use crate::error::{PipelineError, Result};
use crate::recording::Prediction;
use crate::stats::{Counter, SharedStats};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;

/// Sliding-window debounce parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionToTriggerFilter {
    /// Window capacity; values <= 1 evaluate each prediction alone
    pub num_consecutive_predictions: u32,
    /// Occurrences of one label needed to trigger
    pub num_matching_labels: u32,
}

impl Default for PredictionToTriggerFilter {
    fn default() -> Self {
        Self {
            num_consecutive_predictions: 1,
            num_matching_labels: 1,
        }
    }
}

/// Filter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterDetails {
    /// Labels that never enter the window
    pub exclude_activity: BTreeSet<String>,
    /// Minimum confidence; 0 switches to max-confidence selection
    pub confidence_threshold: f64,
    pub prediction_to_trigger_filter: PredictionToTriggerFilter,
    /// Inferences allowed after a trigger; < 1 means unlimited
    pub num_inferences_per_invocation: i32,
    pub cooldown_period_ms: u64,
}

impl Default for FilterDetails {
    fn default() -> Self {
        Self {
            exclude_activity: BTreeSet::new(),
            confidence_threshold: 0.5,
            prediction_to_trigger_filter: PredictionToTriggerFilter::default(),
            num_inferences_per_invocation: 1,
            cooldown_period_ms: 0,
        }
    }
}

impl FilterDetails {
    /// Reject configurations that can never behave sensibly.
    pub fn validate(&self) -> Result<()> {
        let window = &self.prediction_to_trigger_filter;
        if window.num_matching_labels > window.num_consecutive_predictions {
            return Err(PipelineError::InvalidFilterConfig {
                message: format!(
                    "num_matching_labels ({}) exceeds num_consecutive_predictions ({})",
                    window.num_matching_labels, window.num_consecutive_predictions
                ),
            });
        }
        if !self.confidence_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.confidence_threshold)
        {
            return Err(PipelineError::InvalidFilterConfig {
                message: format!(
                    "confidence_threshold {} is outside [0, 1]",
                    self.confidence_threshold
                ),
            });
        }
        Ok(())
    }

    pub fn cooldown_period(&self) -> Duration {
        Duration::from_millis(self.cooldown_period_ms)
    }

    /// Inference budget after a trigger, `None` when unlimited.
    pub fn inference_budget(&self) -> Option<u32> {
        u32::try_from(self.num_inferences_per_invocation)
            .ok()
            .filter(|&n| n >= 1)
    }

    fn selects_max_confidence(&self) -> bool {
        self.confidence_threshold == 0.0
    }
}

/// Where the filter is in its trigger cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// Accumulating predictions, no trigger yet
    Idle,
    /// Trigger fired; counting inferences against the budget
    TriggeredActive { inferences: u32 },
    /// Suppressing predictions until `until`
    Cooldown { until: Duration },
    /// Max-confidence selection made; the trace is no longer evaluated
    Selected,
}

/// A well-formed prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPrediction {
    pub offset: Duration,
    pub label: String,
    pub label_id: i64,
    pub confidence: f64,
}

impl ScoredPrediction {
    fn from_prediction(prediction: Prediction) -> std::result::Result<Self, String> {
        let label = match prediction.label {
            Some(label) if !label.trim().is_empty() => label,
            _ => return Err("missing label".to_string()),
        };
        let confidence = prediction
            .confidence
            .ok_or_else(|| "missing confidence".to_string())?;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(format!("confidence {confidence} is outside [0, 1]"));
        }
        Ok(Self {
            offset: prediction.offset,
            label,
            label_id: prediction.label_id,
            confidence,
        })
    }
}

/// A trigger fired by the sliding window.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub offset: Duration,
    pub label: String,
    pub label_id: i64,
    /// Mean confidence of the matching predictions
    pub confidence: f64,
    /// How many predictions in the window carried the label
    pub matches: usize,
}

/// Output of the filter.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterEvent {
    /// The window met the stability threshold
    Triggered(Trigger),
    /// An admitted prediction while triggered and within budget
    Inference(ScoredPrediction),
    /// The max-confidence prediction of the trace (threshold 0)
    Selected(ScoredPrediction),
}

/// Stateful debouncer for one prediction stream.
pub struct TriggerFilter {
    details: FilterDetails,
    /// Sliding window capacity, at least 1
    capacity: usize,
    /// Matching labels needed, at least 1
    required_matches: usize,
    budget: Option<u32>,
    malformed_policy: ItemPolicy,
    state: FilterState,
    window: VecDeque<ScoredPrediction>,
    best: Option<ScoredPrediction>,
    last_offset: Option<Duration>,
    analyses: u64,
    stats: SharedStats,
}

impl TriggerFilter {
    /// Build a filter, validating the configuration first.
    pub fn new(
        details: FilterDetails,
        malformed_policy: ItemPolicy,
        stats: SharedStats,
    ) -> Result<Self> {
        details.validate()?;
        let window = details.prediction_to_trigger_filter;
        let capacity = window.num_consecutive_predictions.max(1) as usize;

        Ok(Self {
            capacity,
            required_matches: window.num_matching_labels.max(1) as usize,
            budget: details.inference_budget(),
            details,
            malformed_policy,
            state: FilterState::Idle,
            window: VecDeque::with_capacity(capacity),
            best: None,
            last_offset: None,
            analyses: 0,
            stats,
        })
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    /// Predictions evaluated so far (excludes cooldown-suppressed ones).
    pub fn analyses_executed(&self) -> u64 {
        self.analyses
    }

    /// Number of predictions currently in the sliding window.
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Process the next prediction.
    pub fn observe(&mut self, prediction: Prediction) -> Result<Option<FilterEvent>> {
        if self.state == FilterState::Selected {
            return Ok(None);
        }

        let offset = prediction.offset;
        if let Some(previous) = self.last_offset {
            if offset < previous {
                return Err(PipelineError::OutOfOrder { previous, offset });
            }
        }
        self.last_offset = Some(offset);
        self.stats.record(Counter::PredictionsSeen);

        let scored = match ScoredPrediction::from_prediction(prediction) {
            Ok(scored) => scored,
            Err(reason) => return self.on_malformed(offset, reason),
        };

        if let FilterState::Cooldown { until } = self.state {
            if offset < until {
                self.stats.record(Counter::PredictionsSuppressed);
                return Ok(None);
            }
            tracing::debug!(offset_ms = offset.as_millis() as u64, "Cooldown ended");
            self.state = FilterState::Idle;
            self.window.clear();
        }

        self.analyses += 1;

        let state = self.state;
        match state {
            FilterState::TriggeredActive { inferences } => {
                Ok(self.observe_active(scored, inferences))
            }
            FilterState::Idle if self.details.selects_max_confidence() => {
                self.track_best(scored);
                Ok(None)
            }
            FilterState::Idle => Ok(self.observe_idle(scored)),
            FilterState::Cooldown { .. } | FilterState::Selected => Ok(None),
        }
    }

    /// End of stream. Returns the max-confidence selection in threshold-0 mode.
    pub fn finish(&mut self) -> Option<FilterEvent> {
        if !self.details.selects_max_confidence() || self.state == FilterState::Selected {
            return None;
        }
        self.state = FilterState::Selected;
        self.window.clear();
        let selected = self.best.take()?;
        tracing::debug!(
            label = %selected.label,
            confidence = selected.confidence,
            "Selected max-confidence prediction"
        );
        Some(FilterEvent::Selected(selected))
    }

    fn on_malformed(&self, offset: Duration, reason: String) -> Result<Option<FilterEvent>> {
        match self.malformed_policy {
            ItemPolicy::Abort => Err(PipelineError::MalformedPrediction { offset, reason }),
            ItemPolicy::Skip => {
                tracing::warn!(
                    offset_ms = offset.as_millis() as u64,
                    "Skipping malformed prediction: {reason}"
                );
                self.stats.record(Counter::MalformedPredictionsSkipped);
                Ok(None)
            }
        }
    }

    /// Exclusion and threshold gates. Returns false if the prediction is dropped.
    fn admits(&self, scored: &ScoredPrediction) -> bool {
        if self.details.exclude_activity.contains(&scored.label) {
            self.stats.record(Counter::PredictionsExcluded);
            return false;
        }
        if scored.confidence < self.details.confidence_threshold {
            self.stats.record(Counter::PredictionsBelowThreshold);
            return false;
        }
        true
    }

    fn track_best(&mut self, scored: ScoredPrediction) {
        if self.details.exclude_activity.contains(&scored.label) {
            self.stats.record(Counter::PredictionsExcluded);
            return;
        }
        let better = self
            .best
            .as_ref()
            .map_or(true, |best| scored.confidence > best.confidence);
        if better {
            self.best = Some(scored);
        }
    }

    fn observe_idle(&mut self, scored: ScoredPrediction) -> Option<FilterEvent> {
        if !self.admits(&scored) {
            return None;
        }

        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(scored);
        if self.window.len() < self.capacity {
            return None;
        }

        let trigger = self.find_trigger()?;
        tracing::debug!(
            label = %trigger.label,
            offset_ms = trigger.offset.as_millis() as u64,
            matches = trigger.matches,
            "Trigger fired"
        );
        self.stats.record(Counter::TriggersEmitted);
        self.state = FilterState::TriggeredActive { inferences: 0 };
        self.window.clear();
        Some(FilterEvent::Triggered(trigger))
    }

    fn observe_active(&mut self, scored: ScoredPrediction, inferences: u32) -> Option<FilterEvent> {
        let inferences = inferences.saturating_add(1);
        let offset = scored.offset;
        let event = self.admits(&scored).then_some(FilterEvent::Inference(scored));

        match self.budget {
            Some(budget) if inferences >= budget => {
                let until = offset + self.details.cooldown_period();
                tracing::debug!(
                    until_ms = until.as_millis() as u64,
                    "Inference budget exhausted, cooling down"
                );
                self.state = FilterState::Cooldown { until };
            }
            _ => self.state = FilterState::TriggeredActive { inferences },
        }
        event
    }

    /// The most frequent label in a full window, if it occurs often enough.
    /// Ties go to the label that appears first in the window.
    fn find_trigger(&self) -> Option<Trigger> {
        let mut tallies: Vec<(&ScoredPrediction, usize, f64)> = Vec::new();
        for prediction in &self.window {
            match tallies.iter_mut().find(|(p, _, _)| p.label == prediction.label) {
                Some((_, count, sum)) => {
                    *count += 1;
                    *sum += prediction.confidence;
                }
                None => tallies.push((prediction, 1, prediction.confidence)),
            }
        }

        let mut best: Option<(&ScoredPrediction, usize, f64)> = None;
        for tally in tallies {
            if best.map_or(true, |(_, count, _)| tally.1 > count) {
                best = Some(tally);
            }
        }

        let (first, matches, sum) = best.filter(|(_, count, _)| *count >= self.required_matches)?;
        let newest = self.window.back()?;
        Some(Trigger {
            offset: newest.offset,
            label: first.label.clone(),
            label_id: first.label_id,
            confidence: sum / matches as f64,
            matches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::create_shared_stats;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn details(n: u32, m: u32) -> FilterDetails {
        FilterDetails {
            prediction_to_trigger_filter: PredictionToTriggerFilter {
                num_consecutive_predictions: n,
                num_matching_labels: m,
            },
            ..FilterDetails::default()
        }
    }

    fn filter(details: FilterDetails) -> TriggerFilter {
        TriggerFilter::new(details, ItemPolicy::Skip, create_shared_stats()).unwrap()
    }

    fn run(filter: &mut TriggerFilter, labels: &[&str]) -> Vec<FilterEvent> {
        let mut events = Vec::new();
        for (i, label) in labels.iter().enumerate() {
            let prediction = Prediction::new(ms(i as u64 * 100), *label, 0.9);
            events.extend(filter.observe(prediction).unwrap());
        }
        events
    }

    fn triggers(events: &[FilterEvent]) -> Vec<(Duration, String)> {
        events
            .iter()
            .filter_map(|e| match e {
                FilterEvent::Triggered(t) => Some((t.offset, t.label.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_matching_labels_exceeding_window_rejected() {
        let result = TriggerFilter::new(details(2, 3), ItemPolicy::Skip, create_shared_stats());
        assert!(matches!(
            result,
            Err(PipelineError::InvalidFilterConfig { .. })
        ));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let details = FilterDetails {
            confidence_threshold: 1.5,
            ..FilterDetails::default()
        };
        assert!(details.validate().is_err());
    }

    #[test]
    fn test_triggers_when_window_fills() {
        let mut filter = filter(details(3, 2));
        let events = run(&mut filter, &["A", "A", "B", "A", "A"]);

        assert_eq!(triggers(&events), vec![(ms(200), "A".to_string())]);
    }

    #[test]
    fn test_single_prediction_window() {
        let mut filter = filter(FilterDetails {
            num_inferences_per_invocation: 1,
            ..details(0, 0)
        });
        let events = run(&mut filter, &["A", "B", "C"]);

        // A triggers, B uses up the budget, C is evaluated fresh after a zero cooldown
        assert_eq!(
            triggers(&events),
            vec![(ms(0), "A".to_string()), (ms(200), "C".to_string())]
        );
    }

    #[test]
    fn test_excluded_labels_never_enter_window() {
        let mut filter = filter(FilterDetails {
            exclude_activity: ["idle".to_string()].into_iter().collect(),
            ..details(2, 2)
        });
        let events = run(&mut filter, &["idle", "idle", "walk", "idle", "walk"]);

        assert_eq!(triggers(&events), vec![(ms(400), "walk".to_string())]);
    }

    #[test]
    fn test_low_confidence_discarded() {
        let mut filter = filter(details(1, 1));
        let event = filter
            .observe(Prediction::new(ms(0), "walk", 0.2))
            .unwrap();
        assert!(event.is_none());
        assert_eq!(filter.window_len(), 0);
    }

    #[test]
    fn test_budget_then_cooldown() {
        let mut filter = filter(FilterDetails {
            num_inferences_per_invocation: 2,
            cooldown_period_ms: 250,
            ..details(1, 1)
        });

        let event = filter.observe(Prediction::new(ms(0), "A", 0.9)).unwrap();
        assert!(matches!(event, Some(FilterEvent::Triggered(_))));
        assert_eq!(filter.state(), FilterState::TriggeredActive { inferences: 0 });

        let event = filter.observe(Prediction::new(ms(100), "A", 0.9)).unwrap();
        assert!(matches!(event, Some(FilterEvent::Inference(_))));

        filter.observe(Prediction::new(ms(200), "B", 0.9)).unwrap();
        assert_eq!(filter.state(), FilterState::Cooldown { until: ms(450) });

        // Suppressed inside the cooldown
        assert!(filter
            .observe(Prediction::new(ms(300), "A", 0.9))
            .unwrap()
            .is_none());
        assert_eq!(filter.analyses_executed(), 3);

        // Evaluated again once the deadline is reached
        let event = filter.observe(Prediction::new(ms(450), "B", 0.9)).unwrap();
        assert!(matches!(event, Some(FilterEvent::Triggered(ref t)) if t.label == "B"));
    }

    #[test]
    fn test_cooldown_ends_at_deadline() {
        let mut filter = filter(FilterDetails {
            num_inferences_per_invocation: 1,
            cooldown_period_ms: 0,
            ..details(1, 1)
        });

        filter.observe(Prediction::new(ms(0), "A", 0.9)).unwrap();
        let event = filter.observe(Prediction::new(ms(100), "A", 0.9)).unwrap();
        assert!(matches!(event, Some(FilterEvent::Inference(_))));
        assert_eq!(filter.state(), FilterState::Cooldown { until: ms(100) });

        // Same offset as the deadline is already past the cooldown
        let event = filter.observe(Prediction::new(ms(100), "B", 0.9)).unwrap();
        match event {
            Some(FilterEvent::Triggered(trigger)) => {
                assert_eq!(trigger.offset, ms(100));
                assert_eq!(trigger.label, "B");
            }
            other => panic!("expected a trigger, got {other:?}"),
        }
    }

    #[test]
    fn test_prediction_just_before_deadline_suppressed() {
        let mut filter = filter(FilterDetails {
            num_inferences_per_invocation: 1,
            cooldown_period_ms: 250,
            ..details(1, 1)
        });

        filter.observe(Prediction::new(ms(0), "A", 0.9)).unwrap();
        filter.observe(Prediction::new(ms(100), "A", 0.9)).unwrap();
        assert_eq!(filter.state(), FilterState::Cooldown { until: ms(350) });

        assert!(filter
            .observe(Prediction::new(ms(349), "B", 0.9))
            .unwrap()
            .is_none());
        let event = filter.observe(Prediction::new(ms(350), "B", 0.9)).unwrap();
        assert!(matches!(event, Some(FilterEvent::Triggered(ref t)) if t.offset == ms(350)));
    }

    #[test]
    fn test_unlimited_budget_never_cools_down() {
        let mut filter = filter(FilterDetails {
            num_inferences_per_invocation: 0,
            ..details(1, 1)
        });
        let events = run(&mut filter, &["A", "B", "C", "D"]);

        assert_eq!(triggers(&events).len(), 1);
        assert_eq!(events.len(), 4);
        assert_eq!(
            filter.state(),
            FilterState::TriggeredActive { inferences: 3 }
        );
    }

    #[test]
    fn test_max_confidence_selection() {
        let mut filter = filter(FilterDetails {
            confidence_threshold: 0.0,
            ..details(3, 2)
        });
        for (offset, label, confidence) in [(0, "A", 0.4), (1, "B", 0.9), (2, "A", 0.7)] {
            assert!(filter
                .observe(Prediction::new(ms(offset), label, confidence))
                .unwrap()
                .is_none());
        }

        match filter.finish() {
            Some(FilterEvent::Selected(selected)) => {
                assert_eq!(selected.label, "B");
                assert_eq!(selected.confidence, 0.9);
            }
            other => panic!("unexpected {other:?}"),
        }

        // Evaluation has stopped for this trace
        assert_eq!(filter.state(), FilterState::Selected);
        assert!(filter
            .observe(Prediction::new(ms(3), "C", 1.0))
            .unwrap()
            .is_none());
        assert!(filter.finish().is_none());
    }

    #[test]
    fn test_malformed_prediction_skipped_or_fatal() {
        let stats = create_shared_stats();
        let mut lenient = TriggerFilter::new(details(1, 1), ItemPolicy::Skip, stats.clone()).unwrap();
        let missing_label = Prediction {
            offset: ms(5),
            label: None,
            label_id: 0,
            confidence: Some(0.9),
        };
        assert!(lenient.observe(missing_label.clone()).unwrap().is_none());
        assert_eq!(stats.get(Counter::MalformedPredictionsSkipped), 1);

        let mut strict =
            TriggerFilter::new(details(1, 1), ItemPolicy::Abort, create_shared_stats()).unwrap();
        assert!(matches!(
            strict.observe(missing_label),
            Err(PipelineError::MalformedPrediction { .. })
        ));
    }

    #[test]
    fn test_out_of_order_predictions_fail() {
        let mut filter = filter(details(2, 2));
        filter.observe(Prediction::new(ms(10), "A", 0.9)).unwrap();
        assert!(matches!(
            filter.observe(Prediction::new(ms(5), "A", 0.9)),
            Err(PipelineError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn test_trigger_confidence_is_mean_of_matches() {
        let mut filter = filter(details(3, 2));
        filter.observe(Prediction::new(ms(0), "A", 0.6)).unwrap();
        filter.observe(Prediction::new(ms(1), "B", 0.9)).unwrap();
        let event = filter.observe(Prediction::new(ms(2), "A", 0.8)).unwrap();

        match event {
            Some(FilterEvent::Triggered(trigger)) => {
                assert_eq!(trigger.label, "A");
                assert_eq!(trigger.matches, 2);
                assert!((trigger.confidence - 0.7).abs() < 1e-9);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
