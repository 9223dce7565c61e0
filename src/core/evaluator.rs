//! Proximity evaluation.
//!
//! For each position sample the evaluator scans the catalog in catalog order
//! and selects a point when the sample is inside the alert radius and, if a
//! heading is known, travelling toward the point. While an alert is active
//! nothing else is evaluated: the first trigger wins until dismissal.

use crate::catalog::{Catalog, GeoPoint};
use crate::core::alert::{AlertEvent, AlertState};
use crate::core::geometry::{angle_difference, bearing_degrees, distance_meters};
use crate::position::PositionSample;
use serde::{Deserialize, Serialize};

/// Default alert radius in meters.
pub const DEFAULT_RADIUS_METERS: f64 = 204.0;

/// Default heading tolerance in degrees.
pub const DEFAULT_ANGLE_TOLERANCE_DEGREES: f64 = 45.0;

/// Which qualifying point to pick when several are in range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// First qualifying point in catalog order; stops scanning there
    #[default]
    FirstMatch,
    /// Closest qualifying point; ties go to the earlier catalog entry
    Nearest,
}

/// Tunable trigger parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Points closer than this (strictly) are candidates
    pub radius_meters: f64,
    /// Maximum deviation between heading and bearing to the point
    pub angle_tolerance_degrees: f64,
    #[serde(default)]
    pub selection: SelectionPolicy,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            radius_meters: DEFAULT_RADIUS_METERS,
            angle_tolerance_degrees: DEFAULT_ANGLE_TOLERANCE_DEGREES,
            selection: SelectionPolicy::FirstMatch,
        }
    }
}

/// How a single point relates to a sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointAssessment {
    pub distance_meters: f64,
    pub bearing_degrees: f64,
    /// Deviation between heading and bearing, when a heading is known
    pub angle_difference: Option<f64>,
    pub within_radius: bool,
    /// True when there is no heading or it points toward the point
    pub heading_matches: bool,
}

impl PointAssessment {
    pub fn qualifies(&self) -> bool {
        self.within_radius && self.heading_matches
    }
}

/// Measure one point against a sample.
pub fn assess(
    sample: &PositionSample,
    point: &GeoPoint,
    thresholds: &Thresholds,
) -> PointAssessment {
    let here = sample.coordinate();
    let there = point.coordinate();

    let distance = distance_meters(here, there);
    let bearing = bearing_degrees(here, there);
    let angle = sample.heading.map(|heading| angle_difference(heading, bearing));

    PointAssessment {
        distance_meters: distance,
        bearing_degrees: bearing,
        angle_difference: angle,
        within_radius: distance < thresholds.radius_meters,
        // Without directional data, distance alone decides
        heading_matches: angle.map_or(true, |diff| diff <= thresholds.angle_tolerance_degrees),
    }
}

/// Outcome of evaluating one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub state: AlertState,
    pub triggered: Option<AlertEvent>,
}

impl Evaluation {
    fn unchanged(state: &AlertState) -> Self {
        Self {
            state: state.clone(),
            triggered: None,
        }
    }
}

/// Decide the next alert state for `sample`.
///
/// No-op when an alert is already active or the catalog is empty.
pub fn evaluate(
    sample: &PositionSample,
    catalog: &Catalog,
    state: &AlertState,
    thresholds: &Thresholds,
) -> Evaluation {
    if state.is_active() || catalog.is_empty() {
        return Evaluation::unchanged(state);
    }

    let selected = match thresholds.selection {
        SelectionPolicy::FirstMatch => first_match(sample, catalog, thresholds),
        SelectionPolicy::Nearest => nearest_match(sample, catalog, thresholds),
    };

    match selected {
        Some((point, distance)) => {
            let event = AlertEvent {
                point: point.clone(),
                distance_meters: distance,
                bearing_degrees: sample
                    .heading
                    .map(|_| bearing_degrees(sample.coordinate(), point.coordinate())),
                heading: sample.heading,
                raised_at: sample.timestamp,
            };
            Evaluation {
                state: AlertState::raised(point.clone()),
                triggered: Some(event),
            }
        }
        None => Evaluation::unchanged(state),
    }
}

/// Clear the alert state.
pub fn dismiss(_state: &AlertState) -> AlertState {
    AlertState::none()
}

fn first_match<'a>(
    sample: &PositionSample,
    catalog: &'a Catalog,
    thresholds: &Thresholds,
) -> Option<(&'a GeoPoint, f64)> {
    for point in catalog.points() {
        let distance = distance_meters(sample.coordinate(), point.coordinate());
        if distance >= thresholds.radius_meters {
            continue;
        }

        if let Some(heading) = sample.heading {
            let bearing = bearing_degrees(sample.coordinate(), point.coordinate());
            if angle_difference(heading, bearing) > thresholds.angle_tolerance_degrees {
                // Not heading toward it
                continue;
            }
        }

        return Some((point, distance));
    }
    None
}

fn nearest_match<'a>(
    sample: &PositionSample,
    catalog: &'a Catalog,
    thresholds: &Thresholds,
) -> Option<(&'a GeoPoint, f64)> {
    let mut best: Option<(&GeoPoint, f64)> = None;
    for point in catalog.points() {
        let assessment = assess(sample, point, thresholds);
        if !assessment.qualifies() {
            continue;
        }
        // Strict comparison keeps the earlier entry on ties
        if best.map_or(true, |(_, d)| assessment.distance_meters < d) {
            best = Some((point, assessment.distance_meters));
        }
    }
    best
}
