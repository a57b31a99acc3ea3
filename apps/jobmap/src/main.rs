use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jobmap::address::{BuiltinCityGeocoder, FallbackGeocoder, Geocoder, NominatimGeocoder};
use jobmap::config::Config;
use jobmap::http_client::GeoHttpClient;
use jobmap::location::providers::IpApiProvider;
use jobmap::proximity::Catalog;
use jobmap::routes::build_router;
use jobmap::session::JobMapEngine;
use jobmap::state::AppState;

/// Per-request budget for the geocoder and IP lookup calls.
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first; a missing default location aborts startup
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Job Map API v{}", env!("CARGO_PKG_VERSION"));

    // Load the entity catalog
    let catalog = Catalog::from_json_file(&config.catalog_path)
        .with_context(|| format!("loading catalog from {}", config.catalog_path))?;
    info!("Catalog loaded: {} entities", catalog.len());
    if config.engine.service_region.is_none() {
        warn!("No SERVICE_REGION set; every reference point counts as in-region");
    }

    // Initialize upstream clients
    let http = GeoHttpClient::new(UPSTREAM_TIMEOUT)?;
    let nominatim: Arc<dyn Geocoder> = Arc::new(NominatimGeocoder::new(
        http.clone(),
        config.geocoder_url.clone(),
        config.geocoder_country_code.clone(),
        config.geocoder_country_name.clone(),
        config.engine.service_region,
    ));
    let geocoder: Arc<dyn Geocoder> =
        Arc::new(FallbackGeocoder::new(nominatim, Arc::new(BuiltinCityGeocoder)));
    info!("Geocoder initialized ({})", config.geocoder_url);

    let ip_lookup = if config.ip_lookup_url.is_empty() {
        warn!("IP_LOOKUP_URL is empty; network positioning tier disabled");
        None
    } else {
        Some(IpApiProvider::new(http, config.ip_lookup_url.clone()))
    };

    // Build app state
    let engine = Arc::new(JobMapEngine::new(config.engine.clone(), geocoder)?);

    // Sweep idle sessions in the background
    let sweeper = engine.clone();
    let sweep_every = config.engine.session_idle_ttl / 2;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_every);
        loop {
            ticker.tick().await;
            sweeper.evict_idle();
        }
    });

    let state = AppState {
        engine,
        catalog: Arc::new(catalog),
        ip_lookup,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
