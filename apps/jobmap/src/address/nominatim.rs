use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::address::builtin::fold_query;
use crate::address::geocoder::{GeocodeError, GeocodeHit, Geocoder};
use crate::geo::{BoundingBox, Coordinate};
use crate::http_client::GeoHttpClient;

const RESULT_LIMIT: &str = "10";

#[derive(Debug, Deserialize)]
struct NominatimResult {
    lat: String,
    lon: String,
    display_name: String,
}

/// OpenStreetMap Nominatim search, narrowed to one country.
pub struct NominatimGeocoder {
    http: GeoHttpClient,
    search_url: String,
    country_code: String,
    country_name: String,
    region: Option<BoundingBox>,
}

impl NominatimGeocoder {
    pub fn new(
        http: GeoHttpClient,
        search_url: impl Into<String>,
        country_code: impl Into<String>,
        country_name: impl Into<String>,
        region: Option<BoundingBox>,
    ) -> Self {
        Self {
            http,
            search_url: search_url.into(),
            country_code: country_code.into(),
            country_name: country_name.into(),
            region,
        }
    }

    /// Appends the country name unless the query already mentions it.
    fn enhance_query(&self, query: &str) -> String {
        // Compare without spaces so "Viet Nam" and "Vietnam" both count.
        let folded = fold_query(query).replace(' ', "");
        let country = fold_query(&self.country_name).replace(' ', "");
        if country.is_empty() || folded.contains(&country) {
            query.to_string()
        } else {
            format!("{}, {}", query, self.country_name)
        }
    }

    fn to_hits(&self, results: Vec<NominatimResult>) -> Result<Vec<GeocodeHit>, GeocodeError> {
        let mut hits = Vec::with_capacity(results.len());
        for r in results {
            let latitude: f64 = r
                .lat
                .parse()
                .map_err(|_| GeocodeError::InvalidResponse(format!("bad lat {:?}", r.lat)))?;
            let longitude: f64 = r
                .lon
                .parse()
                .map_err(|_| GeocodeError::InvalidResponse(format!("bad lon {:?}", r.lon)))?;

            let Ok(point) = Coordinate::point(latitude, longitude) else {
                continue;
            };
            if self.region.is_some_and(|region| !region.contains(&point)) {
                continue;
            }

            hits.push(GeocodeHit {
                display_name: r.display_name,
                latitude,
                longitude,
            });
        }
        Ok(hits)
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn resolve(&self, query: &str) -> Result<Vec<GeocodeHit>, GeocodeError> {
        let q = self.enhance_query(query);
        let results: Vec<NominatimResult> = self
            .http
            .get_json(
                &self.search_url,
                &[
                    ("format", "json"),
                    ("q", q.as_str()),
                    ("countrycodes", self.country_code.as_str()),
                    ("limit", RESULT_LIMIT),
                ],
            )
            .await?;

        let total = results.len();
        let hits = self.to_hits(results)?;
        debug!(query = %q, kept = hits.len(), total, "Nominatim results filtered to region");
        Ok(hits)
    }
}
