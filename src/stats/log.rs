//! Session statistics.
//!
//! Plain counters about what the agent did. No positions and no alert
//! history are kept, only totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Errors while persisting statistics.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("stats io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stats format error: {0}")]
    Format(#[from] serde_json::Error),
}

/// Counters for the current process, optionally seeded from disk.
#[derive(Debug)]
pub struct SessionStats {
    samples_processed: AtomicU64,
    source_errors: AtomicU64,
    alerts_raised: AtomicU64,
    alerts_dismissed: AtomicU64,
    sessions_started: AtomicU64,
    wake_locks_acquired: AtomicU64,
    wake_lock_failures: AtomicU64,
    process_start: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            samples_processed: AtomicU64::new(0),
            source_errors: AtomicU64::new(0),
            alerts_raised: AtomicU64::new(0),
            alerts_dismissed: AtomicU64::new(0),
            sessions_started: AtomicU64::new(0),
            wake_locks_acquired: AtomicU64::new(0),
            wake_lock_failures: AtomicU64::new(0),
            process_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Counters that accumulate across runs in `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut stats = Self::new();
        stats.persist_path = Some(path);

        if let Err(e) = stats.load() {
            tracing::warn!(error = %e, "could not load previous stats");
        }

        stats
    }

    pub fn record_sample(&self) {
        self.samples_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_source_error(&self) {
        self.source_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_raised(&self) {
        self.alerts_raised.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert_dismissed(&self) {
        self.alerts_dismissed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wake_lock_acquired(&self) {
        self.wake_locks_acquired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wake_lock_failure(&self) {
        self.wake_lock_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_processed: self.samples_processed.load(Ordering::Relaxed),
            source_errors: self.source_errors.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised.load(Ordering::Relaxed),
            alerts_dismissed: self.alerts_dismissed.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            wake_locks_acquired: self.wake_locks_acquired.load(Ordering::Relaxed),
            wake_lock_failures: self.wake_lock_failures.load(Ordering::Relaxed),
            process_start: self.process_start,
            uptime_secs: (Utc::now() - self.process_start).num_seconds().max(0) as u64,
        }
    }

    /// Multi-line summary for the terminal.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Session Statistics:\n\
             - Position samples processed: {}\n\
             - Source errors: {}\n\
             - Alerts raised: {}\n\
             - Alerts dismissed: {}\n\
             - Tracking sessions started: {}\n\
             - Wake locks acquired: {} ({} failed)\n\
             - Uptime: {} seconds",
            stats.samples_processed,
            stats.source_errors,
            stats.alerts_raised,
            stats.alerts_dismissed,
            stats.sessions_started,
            stats.wake_locks_acquired,
            stats.wake_lock_failures,
            stats.uptime_secs
        )
    }

    /// Write counters to the persistence path, if any.
    pub fn save(&self) -> Result<(), StatsError> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let stats = self.snapshot();
        let persisted = PersistedStats {
            samples_processed: stats.samples_processed,
            source_errors: stats.source_errors,
            alerts_raised: stats.alerts_raised,
            alerts_dismissed: stats.alerts_dismissed,
            sessions_started: stats.sessions_started,
            wake_locks_acquired: stats.wake_locks_acquired,
            wake_lock_failures: stats.wake_lock_failures,
            last_updated: Utc::now(),
        };

        std::fs::write(path, serde_json::to_string_pretty(&persisted)?)?;
        Ok(())
    }

    fn load(&mut self) -> Result<(), StatsError> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let persisted = Self::read(path)?;
        self.samples_processed
            .store(persisted.samples_processed, Ordering::Relaxed);
        self.source_errors
            .store(persisted.source_errors, Ordering::Relaxed);
        self.alerts_raised
            .store(persisted.alerts_raised, Ordering::Relaxed);
        self.alerts_dismissed
            .store(persisted.alerts_dismissed, Ordering::Relaxed);
        self.sessions_started
            .store(persisted.sessions_started, Ordering::Relaxed);
        self.wake_locks_acquired
            .store(persisted.wake_locks_acquired, Ordering::Relaxed);
        self.wake_lock_failures
            .store(persisted.wake_lock_failures, Ordering::Relaxed);
        Ok(())
    }

    /// Read persisted counters without constructing a live instance.
    pub fn read(path: &std::path::Path) -> Result<PersistedStats, StatsError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub samples_processed: u64,
    pub source_errors: u64,
    pub alerts_raised: u64,
    pub alerts_dismissed: u64,
    pub sessions_started: u64,
    pub wake_locks_acquired: u64,
    pub wake_lock_failures: u64,
    pub process_start: DateTime<Utc>,
    pub uptime_secs: u64,
}

/// On-disk format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedStats {
    #[serde(default)]
    pub samples_processed: u64,
    #[serde(default)]
    pub source_errors: u64,
    #[serde(default)]
    pub alerts_raised: u64,
    #[serde(default)]
    pub alerts_dismissed: u64,
    #[serde(default)]
    pub sessions_started: u64,
    #[serde(default)]
    pub wake_locks_acquired: u64,
    #[serde(default)]
    pub wake_lock_failures: u64,
    pub last_updated: DateTime<Utc>,
}

/// Thread-safe shared statistics.
pub type SharedStats = Arc<SessionStats>;

pub fn create_shared_stats() -> SharedStats {
    Arc::new(SessionStats::new())
}

pub fn create_shared_stats_with_persistence(path: PathBuf) -> SharedStats {
    Arc::new(SessionStats::with_persistence(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting() {
        let stats = SessionStats::new();
        stats.record_sample();
        stats.record_sample();
        stats.record_alert_raised();
        stats.record_wake_lock_failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.samples_processed, 2);
        assert_eq!(snapshot.alerts_raised, 1);
        assert_eq!(snapshot.alerts_dismissed, 0);
        assert_eq!(snapshot.wake_lock_failures, 1);
    }

    #[test]
    fn test_persistence_round_trip_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("stats.json");

        let first = SessionStats::with_persistence(path.clone());
        first.record_sample();
        first.record_alert_raised();
        first.save().unwrap();

        let second = SessionStats::with_persistence(path.clone());
        second.record_sample();
        let snapshot = second.snapshot();
        assert_eq!(snapshot.samples_processed, 2);
        assert_eq!(snapshot.alerts_raised, 1);

        let on_disk = SessionStats::read(&path).unwrap();
        assert_eq!(on_disk.samples_processed, 1);
    }

    #[test]
    fn test_corrupt_file_starts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        std::fs::write(&path, "{not json").unwrap();

        let stats = SessionStats::with_persistence(path);
        assert_eq!(stats.snapshot().samples_processed, 0);
    }

    #[test]
    fn test_summary_format() {
        let summary = SessionStats::new().summary();
        assert!(summary.contains("Position samples processed: 0"));
        assert!(summary.contains("Alerts raised"));
        assert!(summary.contains("Wake locks acquired"));
    }
}
