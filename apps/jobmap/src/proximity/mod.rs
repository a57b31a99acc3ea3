// Proximity: the read-only entity catalog and the radius filter/ranker over it.

pub mod catalog;
pub mod filter;

pub use catalog::{Catalog, LocatedEntity};
pub use filter::{filter_by_radius, nearby, rank_by_distance, NearbyResults, ProximityResult};
