//! Counters for everything the pipeline processes, drops or skips.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_stats, create_shared_stats_with_persistence, Counter, PipelineStats,
    SharedStats, StatsSnapshot,
};
