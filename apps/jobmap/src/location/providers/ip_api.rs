use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::geo::Coordinate;
use crate::http_client::GeoHttpClient;
use crate::location::providers::{PositionProvider, PositioningError};

/// IP geolocation is city-level at best.
pub const IP_ACCURACY_M: f64 = 5000.0;

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
    city: Option<String>,
    country_name: Option<String>,
    #[serde(default)]
    error: bool,
    reason: Option<String>,
}

/// Network tier: coarse position from the ipapi.co lookup service.
///
/// When the host knows the client's address it asks about that address;
/// otherwise the lookup resolves whatever address the request leaves from.
#[derive(Clone)]
pub struct IpApiProvider {
    http: GeoHttpClient,
    base_url: String,
    client_ip: Option<IpAddr>,
}

impl IpApiProvider {
    pub fn new(http: GeoHttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_ip: None,
        }
    }

    /// Same provider, scoped to one client address.
    pub fn for_client(&self, ip: Option<IpAddr>) -> Self {
        Self {
            client_ip: ip.filter(is_public),
            ..self.clone()
        }
    }

    fn lookup_url(&self) -> String {
        match self.client_ip {
            Some(ip) => format!("{}/{}/json/", self.base_url, ip),
            None => format!("{}/json/", self.base_url),
        }
    }
}

#[async_trait]
impl PositionProvider for IpApiProvider {
    async fn request_position(&self, timeout: Duration) -> Result<Coordinate, PositioningError> {
        let url = self.lookup_url();
        let response = tokio::time::timeout(timeout, self.http.get_json::<IpApiResponse>(&url, &[]))
            .await
            .map_err(|_| PositioningError::Timeout)?
            .map_err(|e| {
                warn!("IP lookup failed: {e}");
                if e.is_timeout() {
                    PositioningError::Timeout
                } else {
                    PositioningError::Unavailable(e.to_string())
                }
            })?;

        coordinate_from_response(response)
    }
}

fn coordinate_from_response(response: IpApiResponse) -> Result<Coordinate, PositioningError> {
    if response.error {
        return Err(PositioningError::Unavailable(
            response.reason.unwrap_or_else(|| "lookup rejected".to_string()),
        ));
    }

    let (Some(lat), Some(lon)) = (response.latitude, response.longitude) else {
        return Err(PositioningError::Unavailable(
            "IP lookup returned no coordinates".to_string(),
        ));
    };

    debug!(
        city = response.city.as_deref().unwrap_or("unknown"),
        country = response.country_name.as_deref().unwrap_or("unknown"),
        "IP lookup resolved"
    );

    Coordinate::new(lat, lon, IP_ACCURACY_M)
        .map_err(|e| PositioningError::Unavailable(e.to_string()))
}

/// Private, loopback and link-local addresses cannot be geolocated.
fn is_public(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified())
        }
        IpAddr::V6(v6) => !(v6.is_loopback() || v6.is_unspecified()),
    }
}
