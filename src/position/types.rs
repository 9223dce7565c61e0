//! Position sample and subscription types.
//!
//! A subscription wraps the receiving end of a push-based location source.
//! Cancelling it stops delivery immediately, even if the producer still has
//! samples in flight.

use crate::core::geometry::Coordinate;
use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// A single fix from the location source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Direction of travel in degrees, `None` when undeterminable
    #[serde(default, deserialize_with = "deserialize_heading")]
    pub heading: Option<f64>,
    /// Ground speed in meters per second, if reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f64>,
    /// When the fix was taken (receipt time if the source omits it)
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl PositionSample {
    pub fn new(latitude: f64, longitude: f64, heading: Option<f64>) -> Self {
        Self {
            latitude,
            longitude,
            heading: heading.and_then(sanitize_heading),
            speed_mps: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Normalize a raw heading into `[0, 360)`; non-finite values mean
/// "no heading".
pub fn sanitize_heading(raw: f64) -> Option<f64> {
    if !raw.is_finite() {
        return None;
    }
    let heading = raw.rem_euclid(360.0);
    // rem_euclid of a tiny negative value can round to 360.0
    Some(if heading >= 360.0 { 0.0 } else { heading })
}

fn deserialize_heading<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?;
    Ok(raw.and_then(sanitize_heading))
}

/// Errors reported by a location source.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    #[error("position source unavailable: {0}")]
    Unavailable(String),
    #[error("position permission denied")]
    PermissionDenied,
    #[error("malformed sample on line {line}: {message}")]
    Malformed { line: usize, message: String },
}

/// Items delivered through a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Sample(PositionSample),
    Error(SourceError),
}

/// A push-based location source.
pub trait PositionSource: Send {
    /// Open a new subscription. Each call yields an independent handle.
    fn subscribe(&mut self) -> Result<Subscription, SourceError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

/// Cancellable handle on a stream of source events.
pub struct Subscription {
    id: Uuid,
    receiver: Receiver<SourceEvent>,
    active: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wrap a receiver. The producer must stop sending once `active` turns
    /// false.
    pub fn new(
        receiver: Receiver<SourceEvent>,
        active: Arc<AtomicBool>,
        worker: Option<JoinHandle<()>>,
    ) -> Self {
        active.store(true, Ordering::SeqCst);
        Self {
            id: Uuid::new_v4(),
            receiver,
            active,
            worker,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Take the next pending event without blocking.
    pub fn try_recv(&self) -> Option<SourceEvent> {
        if !self.is_active() {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<SourceEvent, RecvTimeoutError> {
        if !self.is_active() {
            return Err(RecvTimeoutError::Disconnected);
        }
        let event = self.receiver.recv_timeout(timeout)?;
        if self.is_active() {
            Ok(event)
        } else {
            Err(RecvTimeoutError::Disconnected)
        }
    }

    /// Stop delivery. Idempotent.
    pub fn cancel(&mut self) {
        if self.active.swap(false, Ordering::SeqCst) {
            tracing::debug!(subscription = %self.id, "subscription cancelled");
        }
        if let Some(worker) = self.worker.take() {
            // A worker blocked on a read cannot be interrupted; it exits on
            // its next wake-up, so only reap workers that already finished.
            if worker.is_finished() {
                let _ = worker.join();
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_heading_sanitation() {
        assert_eq!(sanitize_heading(f64::NAN), None);
        assert_eq!(sanitize_heading(f64::INFINITY), None);
        assert_eq!(sanitize_heading(90.0), Some(90.0));
        assert_eq!(sanitize_heading(360.0), Some(0.0));
        assert_eq!(sanitize_heading(-90.0), Some(270.0));
        assert_eq!(sanitize_heading(725.0), Some(5.0));
    }

    #[test]
    fn test_sample_deserialization() {
        let sample: PositionSample =
            serde_json::from_str(r#"{"latitude": 1.5, "longitude": 2.5, "heading": null}"#)
                .unwrap();
        assert_eq!(sample.heading, None);

        let sample: PositionSample =
            serde_json::from_str(r#"{"latitude": 1.5, "longitude": 2.5}"#).unwrap();
        assert_eq!(sample.heading, None);
        assert_eq!(sample.speed_mps, None);

        let sample: PositionSample = serde_json::from_str(
            r#"{"latitude": 1.5, "longitude": 2.5, "heading": -45.0, "speed_mps": 13.4}"#,
        )
        .unwrap();
        assert_eq!(sample.heading, Some(315.0));
        assert_eq!(sample.speed_mps, Some(13.4));
    }

    #[test]
    fn test_cancel_stops_delivery() {
        let (tx, rx) = unbounded();
        let mut subscription = Subscription::new(rx, Arc::new(AtomicBool::new(false)), None);
        assert!(subscription.is_active());

        tx.send(SourceEvent::Sample(PositionSample::new(0.0, 0.0, None)))
            .unwrap();
        subscription.cancel();

        assert!(!subscription.is_active());
        assert!(subscription.try_recv().is_none());
        assert!(subscription
            .recv_timeout(Duration::from_millis(1))
            .is_err());

        // Second cancel is harmless
        subscription.cancel();
    }
}
