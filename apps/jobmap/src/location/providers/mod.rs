//! Positioning capabilities consumed by the acquisition state machine.
//!
//! The machine never talks to hardware or the network directly; it calls a
//! `PositionProvider` per tier. Production: `ReportedFixProvider` (precise, fed by
//! the browser) and `IpApiProvider` (network). Tests inject their own.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::Coordinate;

pub mod ip_api;
pub mod reported;

pub use ip_api::IpApiProvider;
pub use reported::ReportedFixProvider;

/// Failure modes of a positioning tier. All of them advance to the next tier.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositioningError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location request timed out")]
    Timeout,

    #[error("Location unavailable: {0}")]
    Unavailable(String),
}

impl PositioningError {
    /// Positioning failures are never fatal; the next tier is always worth trying.
    pub fn is_retryable(&self) -> bool {
        true
    }
}

/// A source of position fixes for one tier.
#[async_trait]
pub trait PositionProvider: Send + Sync {
    /// Cheap capability check. Unavailable providers are skipped without a request.
    fn is_available(&self) -> bool {
        true
    }

    /// Requests one fix. Implementations should give up after `timeout`; the state
    /// machine also enforces it from the outside.
    async fn request_position(&self, timeout: Duration) -> Result<Coordinate, PositioningError>;
}
