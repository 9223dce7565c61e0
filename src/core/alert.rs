//! Active-alert state and the trigger event handed to alert outputs.

use crate::catalog::GeoPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The currently active alert, if any.
///
/// At most one alert is active at a time. It is created by a trigger and
/// cleared only by dismissal or by stopping the tracking session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    active: Option<GeoPoint>,
}

impl AlertState {
    /// No active alert.
    pub fn none() -> Self {
        Self::default()
    }

    pub(crate) fn raised(point: GeoPoint) -> Self {
        Self {
            active: Some(point),
        }
    }

    pub fn active(&self) -> Option<&GeoPoint> {
        self.active.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Clear the alert, returning the point that was active. Clearing an
    /// empty state is a no-op.
    pub fn dismiss(&mut self) -> Option<GeoPoint> {
        self.active.take()
    }
}

/// A trigger: the evaluator selected `point` for this sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub point: GeoPoint,
    /// Distance from the sample to the point, in meters
    pub distance_meters: f64,
    /// Bearing from the sample to the point (only computed with a heading)
    pub bearing_degrees: Option<f64>,
    /// Heading of the sample that triggered
    pub heading: Option<f64>,
    /// Timestamp of the triggering sample
    pub raised_at: DateTime<Utc>,
}

impl AlertEvent {
    /// One-line banner text for terminal output.
    pub fn banner(&self) -> String {
        format!(
            "Approaching speed camera: {} - limit {} ({:.0} m)",
            self.point.name, self.point.speed_limit, self.distance_meters
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> GeoPoint {
        GeoPoint {
            id: 1,
            name: "Bridge".to_string(),
            latitude: 0.0,
            longitude: 0.0,
            speed_limit: 30,
        }
    }

    #[test]
    fn test_dismiss_is_idempotent() {
        let mut state = AlertState::raised(point());
        assert!(state.is_active());

        assert_eq!(state.dismiss().map(|p| p.id), Some(1));
        assert!(!state.is_active());
        assert!(state.dismiss().is_none());
        assert_eq!(state, AlertState::none());
    }

    #[test]
    fn test_banner_mentions_name_and_limit() {
        let event = AlertEvent {
            point: point(),
            distance_meters: 150.4,
            bearing_degrees: None,
            heading: None,
            raised_at: Utc::now(),
        };
        let banner = event.banner();
        assert!(banner.contains("Bridge"));
        assert!(banner.contains("limit 30"));
        assert!(banner.contains("150 m"));
    }
}
