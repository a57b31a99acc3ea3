//! Job Map sessions: the consumer-facing surface of the engine.
//!
//! One `JobMapSession` per user session bundles the acquisition state machine,
//! the address resolver and the current reference point. `JobMapEngine` creates
//! and tracks sessions and shares the stateless collaborators between them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

use crate::address::{AddressCandidate, AddressResolver, Geocoder, SearchOutcome};
use crate::config::{ConfigError, EngineConfig};
use crate::geo::{BoundingBox, Coordinate};
use crate::location::providers::reported::FixReport;
use crate::location::providers::ReportedFixProvider;
use crate::location::{
    Acquisition, AcquisitionState, LocationAcquirer, LocationSmoother, PositionProvider,
    PositionReading,
};
use crate::proximity::{nearby, LocatedEntity, NearbyResults};

pub mod handlers;

/// Where distances are currently measured from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReferencePoint {
    Device { reading: PositionReading },
    Address { display_name: String, coordinate: Coordinate },
}

impl ReferencePoint {
    pub fn coordinate(&self) -> Coordinate {
        match self {
            ReferencePoint::Device { reading } => reading.coordinate,
            ReferencePoint::Address { coordinate, .. } => *coordinate,
        }
    }
}

#[derive(Default)]
struct ReferenceSlot {
    point: Option<ReferencePoint>,
    /// Bumped whenever the user picks an address; device results that started
    /// before the pick must not overwrite it.
    epoch: u64,
}

pub struct JobMapSession {
    id: Uuid,
    acquirer: LocationAcquirer,
    resolver: AddressResolver,
    reported_fix: Arc<ReportedFixProvider>,
    service_region: Option<BoundingBox>,
    reference: Mutex<ReferenceSlot>,
    last_seen: Mutex<Instant>,
}

impl JobMapSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn acquisition_state(&self) -> AcquisitionState {
        self.acquirer.state()
    }

    pub fn reference_point(&self) -> Option<ReferencePoint> {
        self.reference.lock().point.clone()
    }

    pub fn address_candidates(&self) -> Vec<AddressCandidate> {
        self.resolver.candidates()
    }

    /// Runs the tier chain. `report` is the client's own device fix, if it has one.
    pub async fn acquire_location(
        &self,
        report: Option<FixReport>,
    ) -> Result<Acquisition, ConfigError> {
        let epoch = self.prepare(report);
        let outcome = self.acquirer.acquire().await?;
        self.adopt(epoch, &outcome);
        Ok(outcome)
    }

    /// Forget smoothing history, then acquire from scratch.
    pub async fn retry_location(
        &self,
        report: Option<FixReport>,
    ) -> Result<Acquisition, ConfigError> {
        let epoch = self.prepare(report);
        let outcome = self.acquirer.retry().await?;
        self.adopt(epoch, &outcome);
        Ok(outcome)
    }

    /// Address search, debounced per session.
    pub async fn search_address(&self, query: &str) -> SearchOutcome {
        self.resolver.search(query).await
    }

    /// The chosen candidate becomes the reference point
    /// until device positioning is requested again.
    pub fn select_address_candidate(&self, candidate: &AddressCandidate) -> Coordinate {
        let coordinate = self.resolver.select(candidate);
        let mut slot = self.reference.lock();
        slot.epoch += 1;
        slot.point = Some(ReferencePoint::Address {
            display_name: candidate.display_name.clone(),
            coordinate,
        });
        info!(
            session = %self.id,
            address = %candidate.display_name,
            "Reference point set from address"
        );
        coordinate
    }

    /// Entities around the current reference point, or `None` before one exists.
    pub fn nearby<'a>(
        &self,
        radius_km: f64,
        entities: &'a [LocatedEntity],
    ) -> Option<NearbyResults<'a>> {
        let reference = self.reference_point()?.coordinate();
        Some(nearby(&reference, radius_km, entities, self.service_region.as_ref()))
    }

    fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(*self.last_seen.lock())
    }

    fn prepare(&self, report: Option<FixReport>) -> u64 {
        match report {
            Some(report) => self.reported_fix.submit(report),
            None => self.reported_fix.clear(),
        }
        self.reference.lock().epoch
    }

    fn adopt(&self, epoch: u64, outcome: &Acquisition) {
        let Some(reading) = outcome.reading() else {
            return;
        };
        let mut slot = self.reference.lock();
        if slot.epoch == epoch {
            slot.point = Some(ReferencePoint::Device {
                reading: reading.clone(),
            });
        }
    }
}

/// Creates sessions and keeps them until they are ended or sit idle past
/// `EngineConfig::session_idle_ttl`.
pub struct JobMapEngine {
    config: EngineConfig,
    geocoder: Arc<dyn Geocoder>,
    sessions: Mutex<HashMap<Uuid, Arc<JobMapSession>>>,
}

impl JobMapEngine {
    /// Fails on configuration errors (notably a missing default location) so a
    /// broken deployment never starts serving.
    pub fn new(config: EngineConfig, geocoder: Arc<dyn Geocoder>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            geocoder,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts a session. `network` is the coarse positioning tier for this client.
    pub fn new_session(&self, network: Option<Arc<dyn PositionProvider>>) -> Arc<JobMapSession> {
        self.evict_idle();

        let reported_fix = Arc::new(ReportedFixProvider::new());
        let precise: Arc<dyn PositionProvider> = reported_fix.clone();

        let session = Arc::new(JobMapSession {
            id: Uuid::new_v4(),
            acquirer: LocationAcquirer::new(
                Some(precise),
                network,
                LocationSmoother::new(self.config.smoother.clone()),
                self.config.acquisition.clone(),
            ),
            resolver: AddressResolver::new(self.geocoder.clone(), self.config.resolver.clone()),
            reported_fix,
            service_region: self.config.service_region,
            reference: Mutex::new(ReferenceSlot::default()),
            last_seen: Mutex::new(Instant::now()),
        });

        self.sessions.lock().insert(session.id, session.clone());
        info!(session = %session.id, "Session started");
        session
    }

    /// Looks up a live session and marks it as seen. Idle sessions are dropped here
    /// even if no sweep has run yet.
    pub fn session(&self, id: Uuid) -> Option<Arc<JobMapSession>> {
        let mut sessions = self.sessions.lock();
        let session = sessions.get(&id)?.clone();
        if session.idle_for(Instant::now()) > self.config.session_idle_ttl {
            sessions.remove(&id);
            info!(session = %id, "Session expired");
            return None;
        }
        session.touch();
        Some(session)
    }

    /// Drops every session idle longer than the configured TTL. Returns how many went.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let ttl = self.config.session_idle_ttl;
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, session| session.idle_for(now) <= ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    pub fn end_session(&self, id: Uuid) -> bool {
        let removed = self.sessions.lock().remove(&id).is_some();
        if removed {
            info!(session = %id, "Session ended");
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}
