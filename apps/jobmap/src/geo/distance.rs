//! Great-circle distance on a spherical earth.

use crate::geo::Coordinate;

/// Mean earth radius used for every distance in the engine.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Haversine distance between two coordinates, in kilometers.
///
/// Symmetric, zero for identical points, and continuous across the antimeridian
/// and the poles (the central angle is taken with `atan2`). Accuracy is ignored.
pub fn distance_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude().to_radians();
    let lat2 = b.latitude().to_radians();
    let dlat = (b.latitude() - a.latitude()).to_radians();
    let dlon = (b.longitude() - a.longitude()).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h a hair outside [0, 1] for antipodal points.
    let h = h.clamp(0.0, 1.0);

    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(lat: f64, lon: f64) -> Coordinate {
        Coordinate::point(lat, lon).unwrap()
    }

    #[test]
    fn test_hcmc_to_hanoi() {
        let d = distance_km(&pt(10.8231, 106.6297), &pt(21.0278, 105.8342));
        // Haversine at R = 6371 km gives ~1137.9 km for this pair.
        assert!(d > 1130.0 && d < 1160.0, "Expected ~1138 km, got {d}");
        assert!((d - 1137.88).abs() < 0.05, "got {d}");
    }

    #[test]
    fn test_zero_for_same_point() {
        for (lat, lon) in [(0.0, 0.0), (90.0, 0.0), (-45.5, 179.9), (10.8, 106.6)] {
            let p = pt(lat, lon);
            assert!(distance_km(&p, &p).abs() < 1e-9);
        }
    }

    #[test]
    fn test_symmetric() {
        let a = pt(10.8231, 106.6297);
        let b = pt(-33.8688, 151.2093);
        assert_eq!(distance_km(&a, &b), distance_km(&b, &a));
    }

    #[test]
    fn test_continuous_across_antimeridian() {
        let d = distance_km(&pt(0.0, 179.9), &pt(0.0, -179.9));
        // 0.2 degrees of longitude at the equator ≈ 22.2 km
        assert!((d - 22.24).abs() < 0.1, "got {d}");
    }

    #[test]
    fn test_poles_and_antipodes() {
        // Every meridian meets at the pole.
        assert!(distance_km(&pt(90.0, 0.0), &pt(90.0, 120.0)) < 1e-9);

        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_KM;
        let d = distance_km(&pt(0.0, 0.0), &pt(0.0, 180.0));
        assert!((d - half_circumference).abs() < 1e-6);
    }

    #[test]
    fn test_accuracy_is_ignored() {
        let a = Coordinate::new(10.0, 100.0, 0.0).unwrap();
        let b = Coordinate::new(10.0, 100.0, 5000.0).unwrap();
        assert_eq!(distance_km(&a, &b), 0.0);
    }
}
