//! Static point-of-interest catalog.
//!
//! The catalog is loaded once, before tracking starts, and shared read-only
//! for the rest of the process.

pub mod types;

#[cfg(feature = "remote")]
pub mod remote;

pub use types::{Catalog, CatalogError, GeoPoint};

#[cfg(feature = "remote")]
pub use remote::{BlockingCatalogClient, CatalogClient};

use std::path::Path;

/// Whether a catalog location names an HTTP resource rather than a file.
pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Load a catalog from a file path or, with the `remote` feature, a URL.
pub fn load(location: &str) -> Result<Catalog, CatalogError> {
    if is_remote(location) {
        load_remote(location)
    } else {
        let catalog = Catalog::from_path(Path::new(location))?;
        tracing::info!(path = location, points = catalog.len(), "catalog loaded");
        Ok(catalog)
    }
}

#[cfg(feature = "remote")]
fn load_remote(url: &str) -> Result<Catalog, CatalogError> {
    BlockingCatalogClient::new(url)?.fetch()
}

#[cfg(not(feature = "remote"))]
fn load_remote(url: &str) -> Result<Catalog, CatalogError> {
    Err(CatalogError::RemoteUnsupported(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.com/cameras.json"));
        assert!(is_remote("http://localhost/cameras.json"));
        assert!(!is_remote("/var/lib/cameras.json"));
        assert!(!is_remote("cameras.json"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cameras.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"[{{"id": 3, "name": "Pier", "latitude": 1.0, "longitude": 2.0, "speed_limit": 35}}]"#
        )
        .unwrap();

        let catalog = load(path.to_str().unwrap()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get(3).unwrap().name, "Pier");
    }
}
