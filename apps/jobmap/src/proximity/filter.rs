//! Proximity Filter: radius filtering and distance ranking.
//!
//! Pure functions over borrowed entities: no caching, no shared state, safe to
//! call concurrently over the same catalog.

use serde::Serialize;

use crate::geo::{distance_km, BoundingBox, Coordinate};
use crate::proximity::catalog::LocatedEntity;

/// An entity annotated with its distance from the reference point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProximityResult<'a> {
    pub entity: &'a LocatedEntity,
    pub distance_km: f64,
}

/// Entities within `radius_km` of `reference`, nearest first.
///
/// Ties are broken by entity id so identical inputs always give identical output.
/// `f64::INFINITY` ranks everything; a negative or NaN radius matches nothing.
pub fn filter_by_radius<'a>(
    reference: &Coordinate,
    radius_km: f64,
    entities: &'a [LocatedEntity],
) -> Vec<ProximityResult<'a>> {
    let mut results: Vec<ProximityResult<'a>> = entities
        .iter()
        .map(|entity| ProximityResult {
            entity,
            distance_km: distance_km(reference, &entity.coordinate),
        })
        .filter(|r| r.distance_km <= radius_km)
        .collect();

    results.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.entity.id.cmp(&b.entity.id))
    });
    results
}

/// Every entity, nearest first. For "show all, annotate distance" views.
pub fn rank_by_distance<'a>(
    reference: &Coordinate,
    entities: &'a [LocatedEntity],
) -> Vec<ProximityResult<'a>> {
    filter_by_radius(reference, f64::INFINITY, entities)
}

#[derive(Debug, Clone, Serialize)]
pub struct NearbyResults<'a> {
    pub results: Vec<ProximityResult<'a>>,
    /// True when the reference point lies outside the service region and the
    /// radius was ignored.
    pub outside_region: bool,
    pub radius_km: f64,
}

/// Radius filter gated by the service region.
///
/// A reference point outside `region` (e.g. a traveller abroad, or a bad IP
/// lookup) would match nothing, so everything is ranked instead.
pub fn nearby<'a>(
    reference: &Coordinate,
    radius_km: f64,
    entities: &'a [LocatedEntity],
    region: Option<&BoundingBox>,
) -> NearbyResults<'a> {
    let outside_region = region.is_some_and(|r| !r.contains(reference));
    let results = if outside_region {
        rank_by_distance(reference, entities)
    } else {
        filter_by_radius(reference, radius_km, entities)
    };
    NearbyResults {
        results,
        outside_region,
        radius_km,
    }
}
