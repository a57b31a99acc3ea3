//! Address Resolver: debounced free-text search against a `Geocoder`.
//!
//! Each keystroke calls `search()`. A call waits out the debounce window and is
//! cancelled if another call arrives first, so only the query typed last reaches
//! the (rate-limited) geocoder. A lookup already in flight is allowed to finish,
//! but its result is dropped if a newer query has been issued since.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::address::geocoder::{GeocodeHit, Geocoder};
use crate::geo::Coordinate;

pub const NOT_FOUND_MESSAGE: &str =
    "Address not found. Try a broader query such as a city name (e.g. Hanoi, Ho Chi Minh City, Da Nang).";
pub const UNAVAILABLE_MESSAGE: &str =
    "Address search is temporarily unavailable. Please try again.";

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub debounce: Duration,
    /// Trimmed queries shorter than this never reach the geocoder.
    pub min_query_chars: usize,
    /// An empty result only produces a not-found message from this length on.
    pub not_found_min_chars: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            min_query_chars: 1,
            not_found_min_chars: 2,
        }
    }
}

/// A selectable search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressCandidate {
    pub display_name: String,
    pub coordinate: Coordinate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    Candidates { candidates: Vec<AddressCandidate> },
    NotFound { message: String },
    /// The geocoder failed; the previous candidate list is still in place.
    Unavailable { message: String },
    /// Query too short; the candidate list was emptied.
    Cleared,
    /// A newer search overtook this one.
    Superseded,
}

#[derive(Default)]
struct ResolverState {
    candidates: Vec<AddressCandidate>,
    pending: Option<CancellationToken>,
    latest: u64,
}

pub struct AddressResolver {
    geocoder: Arc<dyn Geocoder>,
    config: ResolverConfig,
    state: Mutex<ResolverState>,
}

impl AddressResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>, config: ResolverConfig) -> Self {
        Self {
            geocoder,
            config,
            state: Mutex::new(ResolverState::default()),
        }
    }

    /// The candidate list from the last successful lookup.
    pub fn candidates(&self) -> Vec<AddressCandidate> {
        self.state.lock().candidates.clone()
    }

    pub async fn search(&self, query: &str) -> SearchOutcome {
        let query = query.trim().to_string();
        let query_chars = query.chars().count();

        let (ticket, token) = {
            let mut state = self.state.lock();
            if let Some(previous) = state.pending.take() {
                previous.cancel();
            }
            state.latest += 1;

            if query_chars < self.config.min_query_chars {
                state.candidates.clear();
                return SearchOutcome::Cleared;
            }

            let token = CancellationToken::new();
            state.pending = Some(token.clone());
            (state.latest, token)
        };

        tokio::select! {
            _ = token.cancelled() => {
                debug!(query = %query, "Address search debounced away");
                return SearchOutcome::Superseded;
            }
            _ = tokio::time::sleep(self.config.debounce) => {}
        }

        {
            let mut state = self.state.lock();
            if state.latest != ticket {
                return SearchOutcome::Superseded;
            }
            state.pending = None;
        }

        info!(query = %query, "Address lookup");
        let result = self.geocoder.resolve(&query).await;

        let mut state = self.state.lock();
        if state.latest != ticket {
            debug!(query = %query, "Discarding stale address lookup result");
            return SearchOutcome::Superseded;
        }

        match result {
            Ok(hits) => {
                let candidates = to_candidates(hits);
                state.candidates = candidates.clone();
                if candidates.is_empty() && query_chars >= self.config.not_found_min_chars {
                    SearchOutcome::NotFound {
                        message: NOT_FOUND_MESSAGE.to_string(),
                    }
                } else {
                    SearchOutcome::Candidates { candidates }
                }
            }
            Err(e) => {
                warn!(query = %query, "Address lookup failed: {e}");
                SearchOutcome::Unavailable {
                    message: UNAVAILABLE_MESSAGE.to_string(),
                }
            }
        }
    }

    /// Turns a chosen candidate into a reference coordinate.
    ///
    /// The geocoder's point is a centroid, not a measurement, so accuracy is 0.
    pub fn select(&self, candidate: &AddressCandidate) -> Coordinate {
        candidate.coordinate.with_accuracy(0.0)
    }
}

impl Drop for AddressResolver {
    fn drop(&mut self) {
        if let Some(pending) = self.state.get_mut().pending.take() {
            pending.cancel();
        }
    }
}

/// Validates hits and drops duplicates, keeping the geocoder's ranking.
fn to_candidates(hits: Vec<GeocodeHit>) -> Vec<AddressCandidate> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter_map(|hit| {
            let coordinate = Coordinate::point(hit.latitude, hit.longitude).ok()?;
            seen.insert(hit.display_name.clone()).then_some(AddressCandidate {
                display_name: hit.display_name,
                coordinate,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::address::geocoder::GeocodeError;

    /// Records every query it receives; answers from a canned table after `delay`.
    #[derive(Default)]
    struct RecordingGeocoder {
        answers: HashMap<String, Vec<GeocodeHit>>,
        delays: HashMap<String, Duration>,
        failing: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingGeocoder {
        fn with(mut self, query: &str, hits: Vec<GeocodeHit>) -> Self {
            self.answers.insert(query.to_string(), hits);
            self
        }

        fn delayed(mut self, query: &str, delay: Duration) -> Self {
            self.delays.insert(query.to_string(), delay);
            self
        }

        fn failing_on(mut self, query: &str) -> Self {
            self.failing.push(query.to_string());
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Geocoder for RecordingGeocoder {
        async fn resolve(&self, query: &str) -> Result<Vec<GeocodeHit>, GeocodeError> {
            self.calls.lock().push(query.to_string());
            if let Some(delay) = self.delays.get(query) {
                tokio::time::sleep(*delay).await;
            }
            if self.failing.iter().any(|q| q == query) {
                return Err(GeocodeError::InvalidResponse("503".to_string()));
            }
            Ok(self.answers.get(query).cloned().unwrap_or_default())
        }
    }

    fn hit(name: &str, lat: f64, lon: f64) -> GeocodeHit {
        GeocodeHit {
            display_name: name.to_string(),
            latitude: lat,
            longitude: lon,
        }
    }

    fn hanoi() -> GeocodeHit {
        hit("Hanoi, Vietnam", 21.0285, 105.8542)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_sends_only_last_query() {
        let geocoder = Arc::new(RecordingGeocoder::default().with("Hanoi", vec![hanoi()]));
        let resolver = AddressResolver::new(geocoder.clone(), ResolverConfig::default());

        let (a, b, c) = tokio::join!(
            resolver.search("Ha"),
            async {
                tokio::time::sleep(ms(100)).await;
                resolver.search("Han").await
            },
            async {
                tokio::time::sleep(ms(200)).await;
                resolver.search("Hanoi").await
            },
        );

        assert_eq!(a, SearchOutcome::Superseded);
        assert_eq!(b, SearchOutcome::Superseded);
        match c {
            SearchOutcome::Candidates { candidates } => {
                assert_eq!(candidates.len(), 1);
                assert_eq!(candidates[0].display_name, "Hanoi, Vietnam");
            }
            other => panic!("expected candidates, got {other:?}"),
        }
        assert_eq!(geocoder.calls(), vec!["Hanoi".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_typing_fires_each_query() {
        let geocoder = Arc::new(RecordingGeocoder::default());
        let resolver = AddressResolver::new(geocoder.clone(), ResolverConfig::default());

        resolver.search("Da").await;
        tokio::time::sleep(ms(500)).await;
        resolver.search("Da Nang").await;

        assert_eq!(geocoder.calls(), vec!["Da".to_string(), "Da Nang".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_result_discarded_when_superseded() {
        let danang = hit("Da Nang, Vietnam", 16.0544, 108.2022);
        let geocoder = Arc::new(
            RecordingGeocoder::default()
                .with("Hanoi", vec![hanoi()])
                .delayed("Hanoi", ms(1000))
                .with("Da Nang", vec![danang.clone()]),
        );
        let resolver = AddressResolver::new(geocoder.clone(), ResolverConfig::default());

        let (first, second) = tokio::join!(resolver.search("Hanoi"), async {
            // The Hanoi lookup was dispatched at 300 ms and is still running.
            tokio::time::sleep(ms(500)).await;
            resolver.search("Da Nang").await
        });

        assert_eq!(first, SearchOutcome::Superseded);
        assert!(matches!(second, SearchOutcome::Candidates { .. }));
        assert_eq!(geocoder.calls().len(), 2);
        assert_eq!(resolver.candidates()[0].display_name, "Da Nang, Vietnam");
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_query_clears_without_lookup() {
        let geocoder = Arc::new(RecordingGeocoder::default().with("Hanoi", vec![hanoi()]));
        let resolver = AddressResolver::new(geocoder.clone(), ResolverConfig::default());

        resolver.search("Hanoi").await;
        assert_eq!(resolver.candidates().len(), 1);

        assert_eq!(resolver.search("   ").await, SearchOutcome::Cleared);
        assert!(resolver.candidates().is_empty());
        assert_eq!(geocoder.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_reports_not_found() {
        let geocoder = Arc::new(RecordingGeocoder::default());
        let resolver = AddressResolver::new(geocoder, ResolverConfig::default());

        match resolver.search("Atlantis").await {
            SearchOutcome::NotFound { message } => assert!(message.contains("city")),
            other => panic!("expected not found, got {other:?}"),
        }
        // Single characters are too vague to call "not found".
        assert_eq!(
            resolver.search("x").await,
            SearchOutcome::Candidates { candidates: vec![] }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_geocoder_failure_keeps_previous_candidates() {
        let danang = hit("Da Nang, Vietnam", 16.0544, 108.2022);
        let geocoder = Arc::new(
            RecordingGeocoder::default()
                .with("Hanoi", vec![hanoi()])
                .with("Da Nang", vec![danang])
                .failing_on("Hanoi Old Quarter"),
        );
        let resolver = AddressResolver::new(geocoder, ResolverConfig::default());

        resolver.search("Hanoi").await;
        let before = resolver.candidates();
        assert_eq!(before.len(), 1);

        match resolver.search("Hanoi Old Quarter").await {
            SearchOutcome::Unavailable { message } => assert_eq!(message, UNAVAILABLE_MESSAGE),
            other => panic!("expected unavailable, got {other:?}"),
        }
        assert_eq!(resolver.candidates(), before);

        // The next successful lookup replaces the kept list wholesale.
        let outcome = resolver.search("Da Nang").await;
        assert!(matches!(outcome, SearchOutcome::Candidates { .. }));
        let names: Vec<_> = resolver
            .candidates()
            .into_iter()
            .map(|c| c.display_name)
            .collect();
        assert_eq!(names, vec!["Da Nang, Vietnam".to_string()]);
    }

    #[test]
    fn test_select_yields_zero_accuracy() {
        let geocoder = Arc::new(RecordingGeocoder::default());
        let resolver = AddressResolver::new(geocoder, ResolverConfig::default());
        let candidate = AddressCandidate {
            display_name: "Hanoi, Vietnam".to_string(),
            coordinate: Coordinate::new(21.0285, 105.8542, 250.0).unwrap(),
        };
        let c = resolver.select(&candidate);
        assert_eq!(c.accuracy(), 0.0);
        assert_eq!(c.latitude(), 21.0285);
    }

    #[test]
    fn test_candidates_deduplicated_and_validated() {
        let candidates = to_candidates(vec![
            hanoi(),
            hanoi(),
            hit("Broken", 95.0, 105.0),
            hit("Hai Phong, Vietnam", 20.8449, 106.6881),
        ]);
        let names: Vec<_> = candidates.iter().map(|c| c.display_name.as_str()).collect();
        assert_eq!(names, vec!["Hanoi, Vietnam", "Hai Phong, Vietnam"]);
    }
}
