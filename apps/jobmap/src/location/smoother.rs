//! Location Smoother: keeps a jumpy device position from teleporting the map.
//!
//! A new reading is an outlier when it implies a speed no person or vehicle
//! could reach, or when its accuracy is far worse than the best recent reading.
//! Outliers are blended towards the last accepted reading instead of dropped:
//! downstream code always needs *some* position to render.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geo::distance_km;
use crate::location::models::{LocationHistory, PositionReading};

/// Tunable outlier thresholds. Defaults documented in DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmootherConfig {
    /// Readings implying a faster speed than this (m/s) are implausible.
    pub max_speed_mps: f64,
    /// Outlier when the new accuracy exceeds `ratio × best accuracy in history`.
    pub accuracy_degradation_ratio: f64,
    /// Upper bound on the weight an outlier gets when blended (0.0 to 1.0).
    pub outlier_max_share: f64,
    pub history_len: usize,
    pub history_max_age_secs: i64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            max_speed_mps: 50.0, // ~180 km/h
            accuracy_degradation_ratio: 10.0,
            outlier_max_share: 0.25,
            history_len: 5,
            history_max_age_secs: 30,
        }
    }
}

/// Why a reading was treated as an outlier. Exposed for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlierReason {
    ImplausibleSpeed,
    DegradedAccuracy,
}

#[derive(Debug, Clone)]
pub struct LocationSmoother {
    config: SmootherConfig,
}

impl LocationSmoother {
    pub fn new(config: SmootherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SmootherConfig {
        &self.config
    }

    /// Empty history sized for this smoother's configuration.
    pub fn new_history(&self) -> LocationHistory {
        LocationHistory::new(
            self.config.history_len,
            chrono::Duration::seconds(self.config.history_max_age_secs),
        )
    }

    /// Classifies `raw` against the history. `None` means the reading is consistent.
    ///
    /// A reading far more accurate than the last accepted one (a device fix after
    /// an IP estimate) is a refinement, never a jump.
    pub fn classify(
        &self,
        raw: &PositionReading,
        history: &LocationHistory,
    ) -> Option<OutlierReason> {
        let last = history.latest()?;

        let raw_accuracy = raw.coordinate.accuracy();
        let last_accuracy = last.coordinate.accuracy();
        if last_accuracy > 0.0
            && raw_accuracy * self.config.accuracy_degradation_ratio <= last_accuracy
        {
            return None;
        }

        let distance_m = distance_km(&last.coordinate, &raw.coordinate) * 1000.0;
        // Movement inside the combined accuracy radius is noise, not travel.
        let noise_m = raw_accuracy.max(last_accuracy);
        if distance_m > noise_m {
            let elapsed_s = (raw.timestamp - last.timestamp).num_milliseconds() as f64 / 1000.0;
            if elapsed_s <= 0.0 || distance_m / elapsed_s > self.config.max_speed_mps {
                return Some(OutlierReason::ImplausibleSpeed);
            }
        }

        if let Some(best) = history.best_accuracy() {
            if best > 0.0 && raw_accuracy > best * self.config.accuracy_degradation_ratio {
                return Some(OutlierReason::DegradedAccuracy);
            }
        }

        None
    }

    /// Decides the reading to use without touching the history.
    ///
    /// Outliers are blended with the last accepted reading by inverse-accuracy
    /// weight. The share of a raw point that is no more accurate than the last one
    /// is capped at `outlier_max_share`.
    pub fn decide(&self, raw: PositionReading, history: &LocationHistory) -> PositionReading {
        let (Some(reason), Some(last)) = (self.classify(&raw, history), history.latest()) else {
            return PositionReading {
                smoothed: false,
                ..raw
            };
        };

        let w_raw = accuracy_weight(raw.coordinate.accuracy());
        let w_last = accuracy_weight(last.coordinate.accuracy());
        let weighted = w_raw / (w_raw + w_last);
        let share = if w_raw > w_last {
            weighted
        } else {
            weighted.min(self.config.outlier_max_share)
        };

        let blended = last.coordinate.lerp(&raw.coordinate, share);

        warn!(
            ?reason,
            share,
            raw_lat = raw.coordinate.latitude(),
            raw_lon = raw.coordinate.longitude(),
            "Outlier position reading, blending with last accepted"
        );

        PositionReading {
            coordinate: blended,
            source: raw.source,
            smoothed: true,
            timestamp: raw.timestamp,
        }
    }

    /// Decides the reading and records it in `history`.
    pub fn apply(&self, raw: PositionReading, history: &mut LocationHistory) -> PositionReading {
        let decided = self.decide(raw, history);
        history.push(decided.clone());
        debug!(
            smoothed = decided.smoothed,
            history_len = history.len(),
            "Recorded position reading"
        );
        decided
    }
}

impl Default for LocationSmoother {
    fn default() -> Self {
        Self::new(SmootherConfig::default())
    }
}

/// Higher for more accurate readings; 100 m accuracy weighs half as much as a perfect fix.
fn accuracy_weight(accuracy_m: f64) -> f64 {
    1.0 / (1.0 + accuracy_m / 100.0)
}
