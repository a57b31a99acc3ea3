//! Location Acquisition: tiered fallback from precise to network to default.
//!
//! States: Idle → Acquiring(tier) → Resolved(tier) | Failed.
//! Tier failures (denied, timeout, unavailable) are absorbed and advance the chain;
//! only a missing default coordinate is an error, and that is a deployment bug.
//!
//! One acquisition is live per machine. Starting another, or resetting, bumps a
//! generation counter and the older call's result is discarded when it lands.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::ConfigError;
use crate::geo::Coordinate;
use crate::location::models::{LocationHistory, PositionReading, PositionSource};
use crate::location::providers::{PositionProvider, PositioningError};
use crate::location::smoother::LocationSmoother;

/// Devices never get to claim a perfect fix; 0 is reserved for non-measured points.
pub const MIN_DEVICE_ACCURACY_M: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct AcquisitionConfig {
    pub precise_timeout: Duration,
    pub network_timeout: Duration,
    /// City centre used when both positioning tiers fail. Required.
    pub default_location: Option<Coordinate>,
    /// Accuracy reported for default-tier readings ("unknown precision").
    pub default_accuracy_m: f64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            precise_timeout: Duration::from_secs(10),
            network_timeout: Duration::from_secs(5),
            default_location: Coordinate::point(10.8231, 106.6797).ok(),
            default_accuracy_m: 10_000.0,
        }
    }
}

impl AcquisitionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_location.is_none() {
            return Err(ConfigError::MissingDefaultLocation);
        }
        if self.default_accuracy_m.is_nan() || self.default_accuracy_m <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_ACCURACY_M",
                message: format!("must be positive, got {}", self.default_accuracy_m),
            });
        }
        if self.precise_timeout.is_zero() || self.network_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "PRECISE_TIMEOUT_MS/NETWORK_TIMEOUT_MS",
                message: "timeouts must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "tier", rename_all = "snake_case")]
pub enum AcquisitionState {
    Idle,
    Acquiring(PositionSource),
    Resolved(PositionSource),
    Failed,
}

/// Outcome of one `acquire()` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    Resolved(PositionReading),
    /// A later `acquire()` or a `reset()` overtook this call; its result was dropped.
    Superseded,
}

impl Acquisition {
    pub fn reading(&self) -> Option<&PositionReading> {
        match self {
            Acquisition::Resolved(r) => Some(r),
            Acquisition::Superseded => None,
        }
    }
}

struct Inner {
    state: AcquisitionState,
    history: LocationHistory,
    generation: u64,
}

/// Per-session acquisition state machine. Owns the session's `LocationHistory`.
pub struct LocationAcquirer {
    precise: Option<Arc<dyn PositionProvider>>,
    network: Option<Arc<dyn PositionProvider>>,
    smoother: LocationSmoother,
    config: AcquisitionConfig,
    inner: Mutex<Inner>,
}

impl LocationAcquirer {
    pub fn new(
        precise: Option<Arc<dyn PositionProvider>>,
        network: Option<Arc<dyn PositionProvider>>,
        smoother: LocationSmoother,
        config: AcquisitionConfig,
    ) -> Self {
        let history = smoother.new_history();
        Self {
            precise,
            network,
            smoother,
            config,
            inner: Mutex::new(Inner {
                state: AcquisitionState::Idle,
                history,
                generation: 0,
            }),
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.inner.lock().state
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().history.len()
    }

    pub fn history_snapshot(&self) -> Vec<PositionReading> {
        self.inner.lock().history.iter().cloned().collect()
    }

    /// Runs the fallback chain and returns the resolved reading.
    ///
    /// Errors only with `ConfigError::MissingDefaultLocation`, after both positioning
    /// tiers have failed and there is no default to fall back to.
    pub async fn acquire(&self) -> Result<Acquisition, ConfigError> {
        let generation = self.begin();

        let tiers = [
            (PositionSource::Precise, &self.precise, self.config.precise_timeout),
            (PositionSource::Network, &self.network, self.config.network_timeout),
        ];

        for (tier, provider, timeout) in tiers {
            if !self.transition(generation, AcquisitionState::Acquiring(tier)) {
                return Ok(Acquisition::Superseded);
            }

            match request_tier(provider.as_deref(), timeout).await {
                Ok(coordinate) => return Ok(self.resolve_measured(generation, tier, coordinate)),
                Err(e) => {
                    info!(?tier, error = %e, "Positioning tier failed, falling back");
                }
            }
        }

        self.resolve_default(generation)
    }

    /// Clears the history and returns to `Idle`. In-flight acquisitions are discarded.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.history.clear();
        inner.state = AcquisitionState::Idle;
        inner.generation += 1;
        info!("Location history cleared");
    }

    /// `reset()` followed by a fresh `acquire()`, unbiased by stale history.
    pub async fn retry(&self) -> Result<Acquisition, ConfigError> {
        self.reset();
        self.acquire().await
    }

    fn begin(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        inner.state = AcquisitionState::Acquiring(PositionSource::Precise);
        inner.generation
    }

    /// Moves to `state` if `generation` is still the live acquisition.
    fn transition(&self, generation: u64, state: AcquisitionState) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }
        inner.state = state;
        true
    }

    fn resolve_measured(
        &self,
        generation: u64,
        tier: PositionSource,
        coordinate: Coordinate,
    ) -> Acquisition {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            info!(?tier, "Discarding superseded position result");
            return Acquisition::Superseded;
        }

        let coordinate = if coordinate.accuracy() < MIN_DEVICE_ACCURACY_M {
            warn!(
                ?tier,
                accuracy = coordinate.accuracy(),
                "Provider claimed sub-meter accuracy, flooring"
            );
            coordinate.with_accuracy(MIN_DEVICE_ACCURACY_M)
        } else {
            coordinate
        };

        let raw = PositionReading::raw(coordinate, tier, Utc::now());
        let reading = self.smoother.apply(raw, &mut inner.history);
        inner.state = AcquisitionState::Resolved(tier);

        info!(
            ?tier,
            smoothed = reading.smoothed,
            accuracy = reading.coordinate.accuracy(),
            "Location resolved"
        );
        Acquisition::Resolved(reading)
    }

    /// Default-tier readings are a placeholder, not a measurement: they are not
    /// smoothed and do not enter the history.
    fn resolve_default(&self, generation: u64) -> Result<Acquisition, ConfigError> {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return Ok(Acquisition::Superseded);
        }

        let Some(default) = self.config.default_location else {
            inner.state = AcquisitionState::Failed;
            error!("All positioning tiers failed and no default location is configured");
            return Err(ConfigError::MissingDefaultLocation);
        };

        inner.state = AcquisitionState::Resolved(PositionSource::Default);
        warn!("Positioning tiers exhausted, using default location");
        Ok(Acquisition::Resolved(PositionReading::raw(
            default.with_accuracy(self.config.default_accuracy_m),
            PositionSource::Default,
            Utc::now(),
        )))
    }
}

async fn request_tier(
    provider: Option<&dyn PositionProvider>,
    timeout: Duration,
) -> Result<Coordinate, PositioningError> {
    let provider = provider
        .ok_or_else(|| PositioningError::Unavailable("no provider configured".to_string()))?;
    if !provider.is_available() {
        return Err(PositioningError::Unavailable(
            "positioning capability not available".to_string(),
        ));
    }

    tokio::time::timeout(timeout, provider.request_position(timeout))
        .await
        .map_err(|_| PositioningError::Timeout)?
}
