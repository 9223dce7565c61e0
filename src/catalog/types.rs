//! Geofenced point types and the immutable catalog that holds them.

use crate::core::geometry::Coordinate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// A fixed point of interest (a speed camera).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Unique identifier within the catalog
    pub id: i64,
    /// Human-readable location name
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Posted speed limit at the camera
    #[serde(alias = "speedLimit")]
    pub speed_limit: i64,
}

impl GeoPoint {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Errors raised while loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("catalog is not a valid point list: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate point id {0} in catalog")]
    DuplicateId(i64),
    #[error("catalog fetch failed: {0}")]
    Fetch(String),
    #[error("remote catalogs need the `remote` feature: {0}")]
    RemoteUnsupported(String),
}

/// Ordered, read-only list of geofenced points.
///
/// Order is the order of the source document and decides which point wins
/// when several qualify for an alert.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Catalog {
    points: Vec<GeoPoint>,
}

impl Catalog {
    /// Build a catalog, rejecting duplicate ids.
    pub fn new(points: Vec<GeoPoint>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(points.len());
        for point in &points {
            if !seen.insert(point.id) {
                return Err(CatalogError::DuplicateId(point.id));
            }
        }
        Ok(Self { points })
    }

    /// Parse a JSON array of points.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let points: Vec<GeoPoint> = serde_json::from_str(json)?;
        Self::new(points)
    }

    /// Load a JSON catalog from disk.
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn points(&self) -> &[GeoPoint] {
        &self.points
    }

    pub fn get(&self, id: i64) -> Option<&GeoPoint> {
        self.points.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
