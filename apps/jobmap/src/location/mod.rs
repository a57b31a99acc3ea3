// Location acquisition: providers, smoothing and the tiered fallback state machine.

pub mod acquisition;
pub mod models;
pub mod providers;
pub mod smoother;

pub use acquisition::{Acquisition, AcquisitionConfig, AcquisitionState, LocationAcquirer};
pub use models::{LocationHistory, PositionReading, PositionSource};
pub use providers::{PositionProvider, PositioningError};
pub use smoother::{LocationSmoother, SmootherConfig};
