use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CoordinateError {
    #[error("Latitude {0} is outside [-90, 90]")]
    Latitude(f64),

    #[error("Longitude {0} is outside [-180, 180]")]
    Longitude(f64),

    #[error("Accuracy {0} must be a non-negative number of meters")]
    Accuracy(f64),

    #[error("Bounding box is inverted: {0}")]
    InvertedBox(String),
}

/// A point on the earth's surface with an accuracy radius in meters.
///
/// Immutable once constructed. `accuracy == 0.0` is reserved for coordinates
/// that do not come from a measurement (geocoder centroids, the configured default).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
    accuracy: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    accuracy: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = CoordinateError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.latitude, raw.longitude, raw.accuracy)
    }
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64, accuracy: f64) -> Result<Self, CoordinateError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }
        if accuracy.is_nan() || accuracy < 0.0 {
            return Err(CoordinateError::Accuracy(accuracy));
        }
        Ok(Self {
            latitude,
            longitude,
            accuracy,
        })
    }

    /// A coordinate with no precision claim (accuracy 0).
    pub fn point(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        Self::new(latitude, longitude, 0.0)
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Same position, different accuracy. Invalid accuracies are clamped to 0.
    pub fn with_accuracy(self, accuracy: f64) -> Self {
        Self {
            accuracy: if accuracy >= 0.0 { accuracy } else { 0.0 },
            ..self
        }
    }

    /// Point along the short great-circle-ish path from `self` towards `other`,
    /// interpolating latitude and longitude linearly. `t = 0` is `self`, `t = 1` is `other`.
    ///
    /// The longitude delta is wrapped into [-180, 180] so interpolation across the
    /// antimeridian takes the short way round.
    pub fn lerp(&self, other: &Coordinate, t: f64) -> Coordinate {
        let t = t.clamp(0.0, 1.0);
        let mut dlon = other.longitude - self.longitude;
        if dlon > 180.0 {
            dlon -= 360.0;
        } else if dlon < -180.0 {
            dlon += 360.0;
        }
        let mut lon = self.longitude + dlon * t;
        if lon > 180.0 {
            lon -= 360.0;
        } else if lon < -180.0 {
            lon += 360.0;
        }
        Coordinate {
            latitude: (self.latitude + (other.latitude - self.latitude) * t).clamp(-90.0, 90.0),
            longitude: lon,
            accuracy: self.accuracy + (other.accuracy - self.accuracy) * t,
        }
    }
}

/// Axis-aligned lat/lon rectangle. Used as the service-region gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn new(
        min_lat: f64,
        max_lat: f64,
        min_lon: f64,
        max_lon: f64,
    ) -> Result<Self, CoordinateError> {
        // Validate the corners through the coordinate constructor.
        Coordinate::point(min_lat, min_lon)?;
        Coordinate::point(max_lat, max_lon)?;
        if min_lat > max_lat || min_lon > max_lon {
            return Err(CoordinateError::InvertedBox(format!(
                "{min_lat},{max_lat},{min_lon},{max_lon}"
            )));
        }
        Ok(Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        })
    }

    /// Mainland Vietnam plus a small margin, as used by the Job Map.
    pub fn vietnam() -> Self {
        Self {
            min_lat: 8.5,
            max_lat: 23.4,
            min_lon: 102.1,
            max_lon: 109.6,
        }
    }

    pub fn contains(&self, c: &Coordinate) -> bool {
        (self.min_lat..=self.max_lat).contains(&c.latitude())
            && (self.min_lon..=self.max_lon).contains(&c.longitude())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_coordinate() {
        let c = Coordinate::new(10.8231, 106.6297, 15.0).unwrap();
        assert_eq!(c.latitude(), 10.8231);
        assert_eq!(c.longitude(), 106.6297);
        assert_eq!(c.accuracy(), 15.0);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert_eq!(
            Coordinate::new(91.0, 0.0, 0.0),
            Err(CoordinateError::Latitude(91.0))
        );
        assert_eq!(
            Coordinate::new(0.0, -180.5, 0.0),
            Err(CoordinateError::Longitude(-180.5))
        );
        assert!(Coordinate::new(0.0, 0.0, -1.0).is_err());
        assert!(Coordinate::new(0.0, 0.0, f64::NAN).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Coordinate =
            serde_json::from_str(r#"{"latitude": 21.0, "longitude": 105.8}"#).unwrap();
        assert_eq!(ok.accuracy(), 0.0);

        let bad = serde_json::from_str::<Coordinate>(r#"{"latitude": 120.0, "longitude": 0.0}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_lerp_across_antimeridian() {
        let a = Coordinate::point(0.0, 179.0).unwrap();
        let b = Coordinate::point(0.0, -179.0).unwrap();
        let mid = a.lerp(&b, 0.5);
        assert!((mid.longitude().abs() - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_lerp_endpoints() {
        let a = Coordinate::new(10.0, 100.0, 5.0).unwrap();
        let b = Coordinate::new(20.0, 110.0, 50.0).unwrap();
        assert_eq!(a.lerp(&b, 0.0), a);
        assert_eq!(a.lerp(&b, 1.0), b);
    }

    #[test]
    fn test_bounding_box() {
        let vn = BoundingBox::vietnam();
        assert!(vn.contains(&Coordinate::point(21.0278, 105.8342).unwrap()));
        assert!(!vn.contains(&Coordinate::point(1.3521, 103.8198).unwrap()));
        assert!(BoundingBox::new(10.0, 5.0, 0.0, 1.0).is_err());
    }
}
