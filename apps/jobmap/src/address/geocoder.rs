use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::http_client::HttpError;

/// One raw hit from a geocoding lookup, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeHit {
    pub display_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("Geocoder request failed: {0}")]
    Http(#[from] HttpError),

    #[error("Geocoder returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Free-text address → coordinates lookup. Results are ranked best first.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Vec<GeocodeHit>, GeocodeError>;
}

/// Tries `primary`, and consults `fallback` when it fails or finds nothing.
///
/// The primary's error is only surfaced if the fallback has nothing either.
pub struct FallbackGeocoder {
    primary: Arc<dyn Geocoder>,
    fallback: Arc<dyn Geocoder>,
}

impl FallbackGeocoder {
    pub fn new(primary: Arc<dyn Geocoder>, fallback: Arc<dyn Geocoder>) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl Geocoder for FallbackGeocoder {
    async fn resolve(&self, query: &str) -> Result<Vec<GeocodeHit>, GeocodeError> {
        let primary_error = match self.primary.resolve(query).await {
            Ok(hits) if !hits.is_empty() => return Ok(hits),
            Ok(_) => None,
            Err(e) => {
                warn!(query = %query, "Primary geocoder failed: {e}");
                Some(e)
            }
        };

        match self.fallback.resolve(query).await {
            Ok(hits) if !hits.is_empty() => {
                debug!(query = %query, hits = hits.len(), "Fallback geocoder answered");
                Ok(hits)
            }
            Ok(hits) => match primary_error {
                Some(e) => Err(e),
                None => Ok(hits),
            },
            Err(fallback_error) => Err(primary_error.unwrap_or(fallback_error)),
        }
    }
}
