// Address search: geocoder capabilities and the debounced resolver on top of them.

pub mod builtin;
pub mod geocoder;
pub mod nominatim;
pub mod resolver;

pub use builtin::BuiltinCityGeocoder;
pub use geocoder::{FallbackGeocoder, GeocodeError, GeocodeHit, Geocoder};
pub use nominatim::NominatimGeocoder;
pub use resolver::{AddressCandidate, AddressResolver, ResolverConfig, SearchOutcome};
