//! Pipeline counters.
//!
//! Every item the pipeline drops or skips is counted here, so nothing is
//! discarded without a record. Counters are atomic so one log can be shared
//! by all per-sensor workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for one pipeline run (optionally accumulated across runs).
#[derive(Debug)]
pub struct PipelineStats {
    samples_seen: AtomicU64,
    duplicates_dropped: AtomicU64,
    values_seeded: AtomicU64,
    missing_values_skipped: AtomicU64,
    dimension_mismatches_skipped: AtomicU64,
    windows_emitted: AtomicU64,
    predictions_seen: AtomicU64,
    malformed_predictions_skipped: AtomicU64,
    predictions_excluded: AtomicU64,
    predictions_below_threshold: AtomicU64,
    predictions_suppressed: AtomicU64,
    triggers_emitted: AtomicU64,
    run_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

/// Which counter to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    SamplesSeen,
    DuplicatesDropped,
    ValuesSeeded,
    MissingValuesSkipped,
    DimensionMismatchesSkipped,
    WindowsEmitted,
    PredictionsSeen,
    MalformedPredictionsSkipped,
    PredictionsExcluded,
    PredictionsBelowThreshold,
    PredictionsSuppressed,
    TriggersEmitted,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            samples_seen: AtomicU64::new(0),
            duplicates_dropped: AtomicU64::new(0),
            values_seeded: AtomicU64::new(0),
            missing_values_skipped: AtomicU64::new(0),
            dimension_mismatches_skipped: AtomicU64::new(0),
            windows_emitted: AtomicU64::new(0),
            predictions_seen: AtomicU64::new(0),
            malformed_predictions_skipped: AtomicU64::new(0),
            predictions_excluded: AtomicU64::new(0),
            predictions_below_threshold: AtomicU64::new(0),
            predictions_suppressed: AtomicU64::new(0),
            triggers_emitted: AtomicU64::new(0),
            run_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a log that accumulates into a JSON file across runs.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!("Could not load previous pipeline stats: {e}");
        }

        stats
    }

    fn counter(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::SamplesSeen => &self.samples_seen,
            Counter::DuplicatesDropped => &self.duplicates_dropped,
            Counter::ValuesSeeded => &self.values_seeded,
            Counter::MissingValuesSkipped => &self.missing_values_skipped,
            Counter::DimensionMismatchesSkipped => &self.dimension_mismatches_skipped,
            Counter::WindowsEmitted => &self.windows_emitted,
            Counter::PredictionsSeen => &self.predictions_seen,
            Counter::MalformedPredictionsSkipped => &self.malformed_predictions_skipped,
            Counter::PredictionsExcluded => &self.predictions_excluded,
            Counter::PredictionsBelowThreshold => &self.predictions_below_threshold,
            Counter::PredictionsSuppressed => &self.predictions_suppressed,
            Counter::TriggersEmitted => &self.triggers_emitted,
        }
    }

    /// Increment a counter by one.
    pub fn record(&self, counter: Counter) {
        self.record_many(counter, 1);
    }

    /// Increment a counter by `count`.
    pub fn record_many(&self, counter: Counter, count: u64) {
        self.counter(counter).fetch_add(count, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counter(counter).load(Ordering::Relaxed)
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_seen: self.get(Counter::SamplesSeen),
            duplicates_dropped: self.get(Counter::DuplicatesDropped),
            values_seeded: self.get(Counter::ValuesSeeded),
            missing_values_skipped: self.get(Counter::MissingValuesSkipped),
            dimension_mismatches_skipped: self.get(Counter::DimensionMismatchesSkipped),
            windows_emitted: self.get(Counter::WindowsEmitted),
            predictions_seen: self.get(Counter::PredictionsSeen),
            malformed_predictions_skipped: self.get(Counter::MalformedPredictionsSkipped),
            predictions_excluded: self.get(Counter::PredictionsExcluded),
            predictions_below_threshold: self.get(Counter::PredictionsBelowThreshold),
            predictions_suppressed: self.get(Counter::PredictionsSuppressed),
            triggers_emitted: self.get(Counter::TriggersEmitted),
            last_updated: Utc::now(),
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Pipeline Statistics:\n\
             - Samples seen: {}\n\
             - Duplicate timestamps dropped: {}\n\
             - Values seeded from defaults: {}\n\
             - Missing values skipped: {}\n\
             - Dimension mismatches skipped: {}\n\
             - Windows emitted: {}\n\
             - Predictions seen: {}\n\
             - Malformed predictions skipped: {}\n\
             - Predictions excluded: {}\n\
             - Predictions below threshold: {}\n\
             - Predictions suppressed by cooldown: {}\n\
             - Triggers emitted: {}\n\
             - Run duration: {} seconds",
            stats.samples_seen,
            stats.duplicates_dropped,
            stats.values_seeded,
            stats.missing_values_skipped,
            stats.dimension_mismatches_skipped,
            stats.windows_emitted,
            stats.predictions_seen,
            stats.malformed_predictions_skipped,
            stats.predictions_excluded,
            stats.predictions_below_threshold,
            stats.predictions_suppressed,
            stats.triggers_emitted,
            (Utc::now() - self.run_start).num_seconds()
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let json =
                serde_json::to_string_pretty(&self.snapshot()).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: StatsSnapshot =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;
                self.restore(&persisted);
            }
        }
        Ok(())
    }

    fn restore(&self, persisted: &StatsSnapshot) {
        let pairs = [
            (Counter::SamplesSeen, persisted.samples_seen),
            (Counter::DuplicatesDropped, persisted.duplicates_dropped),
            (Counter::ValuesSeeded, persisted.values_seeded),
            (Counter::MissingValuesSkipped, persisted.missing_values_skipped),
            (
                Counter::DimensionMismatchesSkipped,
                persisted.dimension_mismatches_skipped,
            ),
            (Counter::WindowsEmitted, persisted.windows_emitted),
            (Counter::PredictionsSeen, persisted.predictions_seen),
            (
                Counter::MalformedPredictionsSkipped,
                persisted.malformed_predictions_skipped,
            ),
            (Counter::PredictionsExcluded, persisted.predictions_excluded),
            (
                Counter::PredictionsBelowThreshold,
                persisted.predictions_below_threshold,
            ),
            (Counter::PredictionsSuppressed, persisted.predictions_suppressed),
            (Counter::TriggersEmitted, persisted.triggers_emitted),
        ];
        for (counter, value) in pairs {
            self.counter(counter).store(value, Ordering::Relaxed);
        }
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.restore(&StatsSnapshot::default());
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters, also the persisted format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub samples_seen: u64,
    pub duplicates_dropped: u64,
    pub values_seeded: u64,
    pub missing_values_skipped: u64,
    pub dimension_mismatches_skipped: u64,
    pub windows_emitted: u64,
    pub predictions_seen: u64,
    pub malformed_predictions_skipped: u64,
    pub predictions_excluded: u64,
    pub predictions_below_threshold: u64,
    pub predictions_suppressed: u64,
    pub triggers_emitted: u64,
    pub last_updated: DateTime<Utc>,
}

/// Thread-safe shared stats.
pub type SharedStats = Arc<PipelineStats>;

pub fn create_shared_stats() -> SharedStats {
    Arc::new(PipelineStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedStats {
    Arc::new(PipelineStats::with_persistence(path))
}
