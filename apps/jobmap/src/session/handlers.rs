use std::net::IpAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::address::{AddressCandidate, SearchOutcome};
use crate::errors::AppError;
use crate::geo::Coordinate;
use crate::location::providers::reported::FixReport;
use crate::location::{
    Acquisition, AcquisitionState, PositionProvider, PositionReading, PositionSource,
    PositioningError,
};
use crate::proximity::filter_by_radius;
use crate::session::{JobMapSession, ReferencePoint};
use crate::state::AppState;

/// Job Map's initial radius.
const DEFAULT_RADIUS_KM: f64 = 5.0;

#[derive(Serialize)]
pub struct SessionCreated {
    pub session_id: Uuid,
}

/// Error codes a browser's geolocation API reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedError {
    PermissionDenied,
    Timeout,
    Unavailable,
}

impl From<ReportedError> for PositioningError {
    fn from(e: ReportedError) -> Self {
        match e {
            ReportedError::PermissionDenied => PositioningError::PermissionDenied,
            ReportedError::Timeout => PositioningError::Timeout,
            ReportedError::Unavailable => {
                PositioningError::Unavailable("device reported position unavailable".to_string())
            }
        }
    }
}

/// What the browser's geolocation call produced, if anything.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocationRequest {
    #[serde(default)]
    pub fix: Option<Coordinate>,
    #[serde(default)]
    pub error: Option<ReportedError>,
}

impl LocationRequest {
    /// An empty body means the client has no report. Anything else must parse.
    fn parse(body: &[u8]) -> Result<Option<FixReport>, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let req: LocationRequest = serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("Invalid location report: {e}")))?;
        Ok(req.into_report())
    }

    fn into_report(self) -> Option<FixReport> {
        match (self.fix, self.error) {
            (Some(fix), _) => Some(FixReport::Fix(fix)),
            (None, Some(error)) => Some(FixReport::Error(error.into())),
            (None, None) => None,
        }
    }
}

#[derive(Serialize)]
pub struct LocationResponse {
    pub superseded: bool,
    pub reading: Option<PositionReading>,
    /// Set when the position is the configured default; the UI shows a precision warning.
    pub precision_warning: bool,
    pub state: AcquisitionState,
}

#[derive(Deserialize)]
pub struct AddressQuery {
    pub q: String,
}

#[derive(Deserialize)]
pub struct RadiusQuery {
    pub radius_km: Option<f64>,
}

#[derive(Deserialize)]
pub struct ProximityRequest {
    pub reference: Coordinate,
    pub radius_km: Option<f64>,
}

#[derive(Serialize)]
pub struct ReferenceResponse {
    pub reference: ReferencePoint,
}

fn find_session(state: &AppState, id: Uuid) -> Result<Arc<JobMapSession>, AppError> {
    state
        .engine
        .session(id)
        .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))
}

/// Missing radius → default; `"inf"` is accepted for "rank everything".
fn validate_radius(radius_km: Option<f64>) -> Result<f64, AppError> {
    let radius = radius_km.unwrap_or(DEFAULT_RADIUS_KM);
    if radius.is_nan() || radius < 0.0 {
        return Err(AppError::Validation(format!(
            "radius_km must be a non-negative number, got {radius}"
        )));
    }
    Ok(radius)
}

/// First hop of `X-Forwarded-For`, when the host sits behind a proxy.
fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")?
        .to_str()
        .ok()?
        .split(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

fn location_response(session: &JobMapSession, outcome: Acquisition) -> LocationResponse {
    let reading = outcome.reading().cloned();
    LocationResponse {
        superseded: reading.is_none(),
        precision_warning: reading
            .as_ref()
            .is_some_and(|r| r.source == PositionSource::Default),
        reading,
        state: session.acquisition_state(),
    }
}

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (StatusCode, Json<SessionCreated>) {
    let network = state.ip_lookup.as_ref().map(|ip| {
        let scoped: Arc<dyn PositionProvider> = Arc::new(ip.for_client(client_ip(&headers)));
        scoped
    });
    let session = state.engine.new_session(network);
    (
        StatusCode::CREATED,
        Json(SessionCreated {
            session_id: session.id(),
        }),
    )
}

/// DELETE /api/v1/sessions/:id
pub async fn handle_end_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.engine.end_session(id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Session {id} not found")))
    }
}

/// POST /api/v1/sessions/:id/location
pub async fn handle_acquire_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<LocationResponse>, AppError> {
    let session = find_session(&state, id)?;
    let report = LocationRequest::parse(&body)?;
    let outcome = session.acquire_location(report).await?;
    Ok(Json(location_response(&session, outcome)))
}

/// POST /api/v1/sessions/:id/location/retry
pub async fn handle_retry_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<LocationResponse>, AppError> {
    let session = find_session(&state, id)?;
    let report = LocationRequest::parse(&body)?;
    let outcome = session.retry_location(report).await?;
    Ok(Json(location_response(&session, outcome)))
}

/// GET /api/v1/sessions/:id/address?q=
pub async fn handle_search_address(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<AddressQuery>,
) -> Result<Json<SearchOutcome>, AppError> {
    let session = find_session(&state, id)?;
    Ok(Json(session.search_address(&params.q).await))
}

/// POST /api/v1/sessions/:id/address/select
pub async fn handle_select_address(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(candidate): Json<AddressCandidate>,
) -> Result<Json<ReferenceResponse>, AppError> {
    let session = find_session(&state, id)?;
    let coordinate = session.select_address_candidate(&candidate);
    Ok(Json(ReferenceResponse {
        reference: ReferencePoint::Address {
            display_name: candidate.display_name,
            coordinate,
        },
    }))
}

/// GET /api/v1/sessions/:id/nearby?radius_km=
pub async fn handle_nearby(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<RadiusQuery>,
) -> Result<Response, AppError> {
    let session = find_session(&state, id)?;
    let radius = validate_radius(params.radius_km)?;
    let results = session.nearby(radius, state.catalog.entities()).ok_or_else(|| {
        AppError::UnprocessableEntity(
            "No reference point yet: acquire a location or select an address first".to_string(),
        )
    })?;
    Ok(Json(results).into_response())
}

/// POST /api/v1/proximity
pub async fn handle_proximity(
    State(state): State<AppState>,
    Json(req): Json<ProximityRequest>,
) -> Result<Response, AppError> {
    let radius = validate_radius(req.radius_km)?;
    let results = filter_by_radius(&req.reference, radius, state.catalog.entities());
    Ok(Json(results).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_radius() {
        assert_eq!(validate_radius(None).unwrap(), DEFAULT_RADIUS_KM);
        assert_eq!(validate_radius(Some(0.0)).unwrap(), 0.0);
        assert_eq!(validate_radius(Some(f64::INFINITY)).unwrap(), f64::INFINITY);
        assert!(validate_radius(Some(-2.0)).is_err());
        assert!(validate_radius(Some(f64::NAN)).is_err());
    }

    #[test]
    fn test_client_ip_from_forwarded_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);

        headers.insert("x-forwarded-for", "14.161.20.5, 10.0.0.2".parse().unwrap());
        assert_eq!(client_ip(&headers), Some("14.161.20.5".parse().unwrap()));

        headers.insert("x-forwarded-for", "garbage".parse().unwrap());
        assert_eq!(client_ip(&headers), None);
    }

    #[test]
    fn test_location_request_prefers_fix() {
        let req: LocationRequest = serde_json::from_str(
            r#"{"fix": {"latitude": 10.0, "longitude": 106.0, "accuracy": 12}, "error": "timeout"}"#,
        )
        .unwrap();
        assert!(matches!(req.into_report(), Some(FixReport::Fix(_))));

        let req: LocationRequest =
            serde_json::from_str(r#"{"error": "permission_denied"}"#).unwrap();
        assert_eq!(
            req.into_report(),
            Some(FixReport::Error(PositioningError::PermissionDenied))
        );

        let req: LocationRequest = serde_json::from_str(r#"{"error": "unavailable"}"#).unwrap();
        assert!(matches!(
            req.into_report(),
            Some(FixReport::Error(PositioningError::Unavailable(_)))
        ));

        assert_eq!(LocationRequest::default().into_report(), None);
    }

    #[test]
    fn test_parse_location_body() {
        assert_eq!(LocationRequest::parse(b"").unwrap(), None);
        assert_eq!(LocationRequest::parse(b"  \n").unwrap(), None);
        assert_eq!(LocationRequest::parse(b"{}").unwrap(), None);
        assert_eq!(
            LocationRequest::parse(br#"{"error": "timeout"}"#).unwrap(),
            Some(FixReport::Error(PositioningError::Timeout))
        );
    }

    #[test]
    fn test_malformed_location_body_rejected() {
        let bad_bodies: [&[u8]; 4] = [
            br#"{"fix": {"latitude": 120.0, "longitude": 106.0}}"#,
            br#"{"error": "permision_denied"}"#,
            br#"{"fixx": {"latitude": 10.0, "longitude": 106.0}}"#,
            b"not json",
        ];
        for body in bad_bodies {
            assert!(
                matches!(LocationRequest::parse(body), Err(AppError::Validation(_))),
                "accepted {:?}",
                String::from_utf8_lossy(body)
            );
        }
    }
}
