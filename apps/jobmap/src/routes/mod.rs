pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::session::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Sessions
        .route("/api/v1/sessions", post(handlers::handle_create_session))
        .route("/api/v1/sessions/:id", delete(handlers::handle_end_session))
        // Location acquisition
        .route(
            "/api/v1/sessions/:id/location",
            post(handlers::handle_acquire_location),
        )
        .route(
            "/api/v1/sessions/:id/location/retry",
            post(handlers::handle_retry_location),
        )
        // Address search
        .route(
            "/api/v1/sessions/:id/address",
            get(handlers::handle_search_address),
        )
        .route(
            "/api/v1/sessions/:id/address/select",
            post(handlers::handle_select_address),
        )
        // Proximity
        .route("/api/v1/sessions/:id/nearby", get(handlers::handle_nearby))
        .route("/api/v1/proximity", post(handlers::handle_proximity))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::address::BuiltinCityGeocoder;
    use crate::config::EngineConfig;
    use crate::proximity::Catalog;
    use crate::session::JobMapEngine;

    fn app_state() -> AppState {
        let engine =
            JobMapEngine::new(EngineConfig::default(), Arc::new(BuiltinCityGeocoder)).unwrap();
        let catalog = Catalog::from_json_str(include_str!("../../data/companies.json")).unwrap();
        AppState {
            engine: Arc::new(engine),
            catalog: Arc::new(catalog),
            ip_lookup: None,
        }
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(b) => builder
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn create_session(app: &Router) -> String {
        let (status, body) = send(app, "POST", "/api/v1/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        body["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(app_state());
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["catalog_entities"], 20);
    }

    #[tokio::test]
    async fn test_acquire_then_nearby() {
        let app = build_router(app_state());
        let id = create_session(&app).await;

        let (status, _) = send(&app, "GET", &format!("/api/v1/sessions/{id}/nearby"), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let fix = json!({
            "fix": { "latitude": 10.8231, "longitude": 106.6797, "accuracy": 15.0 }
        });
        let uri = format!("/api/v1/sessions/{id}/location");
        let (status, body) = send(&app, "POST", &uri, Some(fix)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reading"]["source"], "precise");
        assert_eq!(body["precision_warning"], false);
        assert_eq!(body["state"]["state"], "resolved");

        let (status, body) = send(
            &app,
            "GET",
            &format!("/api/v1/sessions/{id}/nearby?radius_km=2"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outside_region"], false);
        let results = body["results"].as_array().unwrap();
        assert!(!results.is_empty());
        assert_eq!(results[0]["entity"]["id"], "company-001");
    }

    #[tokio::test]
    async fn test_denied_without_network_warns_precision() {
        let app = build_router(app_state());
        let id = create_session(&app).await;

        let denied = json!({ "error": "permission_denied" });
        let uri = format!("/api/v1/sessions/{id}/location/retry");
        let (status, body) = send(&app, "POST", &uri, Some(denied)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reading"]["source"], "default");
        assert_eq!(body["precision_warning"], true);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_and_select_address() {
        let app = build_router(app_state());
        let id = create_session(&app).await;

        let uri = format!("/api/v1/sessions/{id}/address?q=hanoi");
        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "candidates");
        let candidate = body["candidates"][0].clone();
        assert_eq!(candidate["display_name"], "Hanoi, Vietnam");

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/v1/sessions/{id}/address/select"),
            Some(candidate),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reference"]["kind"], "address");
        assert_eq!(body["reference"]["coordinate"]["accuracy"], 0.0);

        let uri = format!("/api/v1/sessions/{id}/nearby?radius_km=5");
        let (_, body) = send(&app, "GET", &uri, None).await;
        let results = body["results"].as_array().unwrap();
        assert!(results.iter().all(|r| r["entity"]["payload"]["city"] == "Hanoi"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_not_found() {
        let app = build_router(app_state());
        let id = create_session(&app).await;
        let uri = format!("/api/v1/sessions/{id}/address?q=Atlantis");
        let (_, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(body["status"], "not_found");
    }

    #[tokio::test]
    async fn test_stateless_proximity() {
        let app = build_router(app_state());
        let req = json!({
            "reference": { "latitude": 21.0285, "longitude": 105.8542 },
            "radius_km": 3.0
        });
        let (status, body) = send(&app, "POST", "/api/v1/proximity", Some(req)).await;
        assert_eq!(status, StatusCode::OK);
        let results = body.as_array().unwrap();
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r["distance_km"].as_f64().unwrap() <= 3.0));

        let bad = json!({
            "reference": { "latitude": 21.0, "longitude": 105.8 },
            "radius_km": -1.0
        });
        let (status, body) = send(&app, "POST", "/api/v1/proximity", Some(bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_malformed_location_report_rejected() {
        let app = build_router(app_state());
        let id = create_session(&app).await;
        let uri = format!("/api/v1/sessions/{id}/location");

        let bad_fix = json!({ "fix": { "latitude": 120.0, "longitude": 106.0 } });
        let (status, body) = send(&app, "POST", &uri, Some(bad_fix)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let typo = json!({ "error": "permision_denied" });
        let (status, _) = send(&app, "POST", &uri, Some(typo)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // No body at all is a valid "no device fix" request.
        let (status, body) = send(&app, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reading"]["source"], "default");
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let app = build_router(app_state());
        let uri = format!("/api/v1/sessions/{}/location", uuid::Uuid::new_v4());
        let (status, body) = send(&app, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_end_session() {
        let app = build_router(app_state());
        let id = create_session(&app).await;
        let (status, _) = send(&app, "DELETE", &format!("/api/v1/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "DELETE", &format!("/api/v1/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
