// Geometry primitives shared by every other engine module.
// Pure value types and functions only. No I/O, no shared state.

pub mod coordinate;
pub mod distance;

pub use coordinate::{BoundingBox, Coordinate, CoordinateError};
pub use distance::{distance_km, EARTH_RADIUS_KM};
