//! Recording Triggers - streaming windowing and trigger filtering for
//! multi-sensor recordings.
//!
//! This library turns raw per-sensor sample streams into windowed sequences
//! and turns noisy per-step model predictions into a few debounced trigger
//! annotations.
//!
//! # Guarantees
//!
//! - **One value per offset**: duplicate timestamps are resolved or rejected
//! - **Fail fast on disorder**: out-of-order offsets are errors, never re-sorted
//! - **Nothing silently dropped**: every skipped item is counted in [`stats`]
//! - **Isolated filters**: each prediction stream gets its own filter state
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Recording Triggers                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │ Duplicates  │──▶│  Windowing  │──▶│  Sequence   │       │
//! │  │ (resolver)  │   │ (assembler) │   │ (validated) │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │         ▲                 ▲                                 │
//! │         │          ┌─────────────┐                          │
//! │         │          │   Sensor    │                          │
//! │         └──────────│   Options   │                          │
//! │                    └─────────────┘                          │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐       │
//! │  │ Predictions │──▶│   Trigger   │──▶│ Annotations │       │
//! │  │             │   │   Filter    │   │             │       │
//! │  └─────────────┘   └─────────────┘   └─────────────┘       │
//! │                           │                                 │
//! │                           ▼                                 │
//! │                    ┌─────────────┐                          │
//! │                    │    Stats    │                          │
//! │                    └─────────────┘                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use recording_triggers::core::{FilterDetails, FilterEvent, TriggerFilter};
//! use recording_triggers::config::ItemPolicy;
//! use recording_triggers::recording::Prediction;
//! use recording_triggers::stats::create_shared_stats;
//! use std::time::Duration;
//!
//! let mut filter = TriggerFilter::new(
//!     FilterDetails::default(),
//!     ItemPolicy::Skip,
//!     create_shared_stats(),
//! )
//! .expect("valid filter config");
//!
//! let prediction = Prediction::new(Duration::from_millis(0), "walk", 0.9);
//! if let Some(FilterEvent::Triggered(trigger)) = filter.observe(prediction).unwrap() {
//!     println!("{} at {:?}", trigger.label, trigger.offset);
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod recording;
pub mod stats;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError, ItemPolicy, PartialWindowPolicy, PipelineConfig};
pub use self::core::{
    annotate_recording, process_recording, DuplicateTimestampStrategy, FilterDetails,
    FilterEvent, RecordingCollectionSensorOptions, SensorOptionsTable, TriggerAnnotator,
    TriggerFilter, WindowAssembler,
};
pub use error::{PipelineError, Result};
pub use stats::{PipelineStats, SharedStats, StatsSnapshot};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
