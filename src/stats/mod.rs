//! Counters describing what the agent has done.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_stats, create_shared_stats_with_persistence, PersistedStats, SessionStats,
    SharedStats, StatsError, StatsSnapshot,
};
