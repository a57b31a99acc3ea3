use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// Which acquisition tier produced a reading. Tiers are tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    Precise,
    Network,
    Default,
}

impl PositionSource {
    /// The tier tried after this one, if any.
    pub fn next(self) -> Option<PositionSource> {
        match self {
            PositionSource::Precise => Some(PositionSource::Network),
            PositionSource::Network => Some(PositionSource::Default),
            PositionSource::Default => None,
        }
    }

    /// Whether the tier is backed by a real measurement (and therefore smoothed).
    pub fn is_measured(self) -> bool {
        !matches!(self, PositionSource::Default)
    }
}

/// One position produced by an acquisition attempt.
///
/// Superseded readings are dropped, never mutated; smoothing produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReading {
    pub coordinate: Coordinate,
    pub source: PositionSource,
    /// True if the smoother altered the raw reading.
    pub smoothed: bool,
    pub timestamp: DateTime<Utc>,
}

impl PositionReading {
    pub fn raw(coordinate: Coordinate, source: PositionSource, timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            source,
            smoothed: false,
            timestamp,
        }
    }
}

/// Bounded FIFO of recently accepted readings for one session.
///
/// Owned by the acquisition state machine; never shared or persisted.
#[derive(Debug, Clone)]
pub struct LocationHistory {
    readings: VecDeque<PositionReading>,
    capacity: usize,
    max_age: chrono::Duration,
}

impl LocationHistory {
    pub fn new(capacity: usize, max_age: chrono::Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            readings: VecDeque::with_capacity(capacity),
            capacity,
            max_age,
        }
    }

    /// Appends a reading, evicting entries that fell out of the age window
    /// (relative to the new reading) and then the oldest beyond capacity.
    pub fn push(&mut self, reading: PositionReading) {
        let cutoff = reading.timestamp - self.max_age;
        self.readings.retain(|r| r.timestamp > cutoff);
        self.readings.push_back(reading);
        while self.readings.len() > self.capacity {
            self.readings.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&PositionReading> {
        self.readings.back()
    }

    /// Smallest (best) accuracy currently in the window.
    pub fn best_accuracy(&self) -> Option<f64> {
        self.readings
            .iter()
            .map(|r| r.coordinate.accuracy())
            .min_by(|a, b| a.total_cmp(b))
    }

    pub fn clear(&mut self) {
        self.readings.clear();
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionReading> {
        self.readings.iter()
    }
}
