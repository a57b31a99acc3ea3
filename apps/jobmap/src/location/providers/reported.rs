use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;
use crate::location::providers::{PositionProvider, PositioningError};

/// What the browser's own geolocation call produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixReport {
    Fix(Coordinate),
    Error(PositioningError),
}

/// Precise tier backed by a fix the client measured itself and reported to the host.
///
/// Each report is consumed by exactly one request; a request with no pending
/// report is `Unavailable`, which moves the chain on to network positioning.
#[derive(Debug, Default)]
pub struct ReportedFixProvider {
    pending: Mutex<Option<FixReport>>,
}

impl ReportedFixProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the next report, replacing any that was never consumed.
    pub fn submit(&self, report: FixReport) {
        *self.pending.lock() = Some(report);
    }

    pub fn clear(&self) {
        self.pending.lock().take();
    }
}

#[async_trait]
impl PositionProvider for ReportedFixProvider {
    async fn request_position(&self, _timeout: Duration) -> Result<Coordinate, PositioningError> {
        match self.pending.lock().take() {
            Some(FixReport::Fix(coordinate)) => Ok(coordinate),
            Some(FixReport::Error(e)) => Err(e),
            None => Err(PositioningError::Unavailable(
                "client did not report a device fix".to_string(),
            )),
        }
    }
}
