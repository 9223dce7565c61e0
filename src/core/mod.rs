//! Core proximity-alert logic.
//!
//! This module contains:
//! - Great-circle distance and bearing geometry
//! - The proximity evaluator deciding when a sample triggers an alert
//! - The single active-alert state

pub mod alert;
pub mod evaluator;
pub mod geometry;

// Re-export commonly used types
pub use alert::{AlertEvent, AlertState};
pub use evaluator::{
    assess, dismiss, evaluate, Evaluation, PointAssessment, SelectionPolicy, Thresholds,
    DEFAULT_ANGLE_TOLERANCE_DEGREES, DEFAULT_RADIUS_METERS,
};
pub use geometry::{angle_difference, bearing_degrees, distance_meters, Coordinate, EARTH_RADIUS_KM};
