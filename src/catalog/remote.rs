//! One-shot catalog fetch over HTTP.
//!
//! The catalog is requested exactly once before tracking starts. There is
//! no polling, no refresh and no retry.

use super::types::{Catalog, CatalogError, GeoPoint};

/// Async HTTP client for a remote catalog document.
pub struct CatalogClient {
    client: reqwest::Client,
    url: String,
}

impl CatalogClient {
    /// Create a client for the given catalog URL.
    pub fn new(url: impl Into<String>) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| CatalogError::Fetch(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch and parse the catalog.
    pub async fn fetch(&self) -> Result<Catalog, CatalogError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| CatalogError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Fetch(format!(
                "{} returned {}",
                self.url,
                status.as_u16()
            )));
        }

        let points: Vec<GeoPoint> = response
            .json()
            .await
            .map_err(|e| CatalogError::Fetch(format!("invalid catalog body: {e}")))?;

        tracing::info!(url = %self.url, points = points.len(), "catalog fetched");
        Catalog::new(points)
    }
}

/// Blocking wrapper for use from the synchronous agent.
pub struct BlockingCatalogClient {
    inner: CatalogClient,
    runtime: tokio::runtime::Runtime,
}

impl BlockingCatalogClient {
    pub fn new(url: impl Into<String>) -> Result<Self, CatalogError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CatalogError::Fetch(format!("failed to create runtime: {e}")))?;

        Ok(Self {
            inner: CatalogClient::new(url)?,
            runtime,
        })
    }

    pub fn fetch(&self) -> Result<Catalog, CatalogError> {
        self.runtime.block_on(self.inner.fetch())
    }

    pub fn url(&self) -> &str {
        self.inner.url()
    }
}
