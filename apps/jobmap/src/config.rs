use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::address::ResolverConfig;
use crate::geo::{BoundingBox, Coordinate};
use crate::location::{AcquisitionConfig, SmootherConfig};

/// Deployment mistakes. These fail startup; they are never shown to end users.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No default location configured; set DEFAULT_LOCATION to \"lat,lon\"")]
    MissingDefaultLocation,

    #[error("Invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("Entity catalog error: {message}")]
    Catalog { message: String },
}

/// Everything the engine needs, validated once at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub acquisition: AcquisitionConfig,
    pub smoother: SmootherConfig,
    pub resolver: ResolverConfig,
    /// Reference points outside this box get an unfiltered, ranked listing.
    pub service_region: Option<BoundingBox>,
    /// Sessions not touched for this long are evicted.
    pub session_idle_ttl: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            acquisition: AcquisitionConfig::default(),
            smoother: SmootherConfig::default(),
            resolver: ResolverConfig::default(),
            service_region: Some(BoundingBox::vietnam()),
            session_idle_ttl: Duration::from_secs(30 * 60),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.acquisition.validate()?;

        let s = &self.smoother;
        if s.max_speed_mps.is_nan() || s.max_speed_mps <= 0.0 {
            return Err(invalid(
                "MAX_SPEED_MPS",
                format!("must be positive, got {}", s.max_speed_mps),
            ));
        }
        if s.accuracy_degradation_ratio.is_nan() || s.accuracy_degradation_ratio < 1.0 {
            return Err(invalid(
                "ACCURACY_DEGRADATION_RATIO",
                format!("must be at least 1, got {}", s.accuracy_degradation_ratio),
            ));
        }
        if s.outlier_max_share.is_nan()
            || s.outlier_max_share <= 0.0
            || s.outlier_max_share > 1.0
        {
            return Err(invalid(
                "OUTLIER_MAX_SHARE",
                format!("must be in (0, 1], got {}", s.outlier_max_share),
            ));
        }
        if s.history_len == 0 {
            return Err(invalid("HISTORY_LEN", "must be at least 1".to_string()));
        }
        if s.history_max_age_secs < 0 {
            return Err(invalid(
                "HISTORY_MAX_AGE_SECS",
                format!("must not be negative, got {}", s.history_max_age_secs),
            ));
        }
        if self.session_idle_ttl.is_zero() {
            return Err(invalid("SESSION_IDLE_TTL_SECS", "must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Application configuration loaded from environment variables.
/// Every variable has a default; malformed values fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub engine: EngineConfig,
    pub geocoder_url: String,
    pub geocoder_country_code: String,
    pub geocoder_country_name: String,
    pub ip_lookup_url: String,
    pub catalog_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key → value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| {
            lookup(key).unwrap_or_else(|| default.to_string())
        };

        let acquisition = AcquisitionConfig {
            precise_timeout: Duration::from_millis(parse_var(
                &lookup,
                "PRECISE_TIMEOUT_MS",
                10_000,
            )?),
            network_timeout: Duration::from_millis(parse_var(
                &lookup,
                "NETWORK_TIMEOUT_MS",
                5_000,
            )?),
            default_location: parse_location(&var("DEFAULT_LOCATION", "10.8231,106.6797"))?,
            default_accuracy_m: parse_var(&lookup, "DEFAULT_ACCURACY_M", 10_000.0)?,
        };

        let smoother = SmootherConfig {
            max_speed_mps: parse_var(&lookup, "MAX_SPEED_MPS", 50.0)?,
            accuracy_degradation_ratio: parse_var(&lookup, "ACCURACY_DEGRADATION_RATIO", 10.0)?,
            outlier_max_share: parse_var(&lookup, "OUTLIER_MAX_SHARE", 0.25)?,
            history_len: parse_var(&lookup, "HISTORY_LEN", 5)?,
            history_max_age_secs: parse_var(&lookup, "HISTORY_MAX_AGE_SECS", 30)?,
        };

        let resolver = ResolverConfig {
            debounce: Duration::from_millis(parse_var(&lookup, "DEBOUNCE_MS", 300)?),
            min_query_chars: parse_var(&lookup, "MIN_QUERY_CHARS", 1)?,
            not_found_min_chars: parse_var(&lookup, "NOT_FOUND_MIN_CHARS", 2)?,
        };

        let engine = EngineConfig {
            acquisition,
            smoother,
            resolver,
            service_region: parse_region(&var("SERVICE_REGION", "8.5,23.4,102.1,109.6"))?,
            session_idle_ttl: Duration::from_secs(parse_var(
                &lookup,
                "SESSION_IDLE_TTL_SECS",
                30 * 60,
            )?),
        };
        engine.validate()?;

        Ok(Config {
            port: parse_var(&lookup, "PORT", 8080)?,
            rust_log: var("RUST_LOG", "info"),
            engine,
            geocoder_url: var("GEOCODER_URL", "https://nominatim.openstreetmap.org/search"),
            geocoder_country_code: var("GEOCODER_COUNTRY", "vn"),
            geocoder_country_name: var("GEOCODER_COUNTRY_NAME", "Vietnam"),
            ip_lookup_url: var("IP_LOOKUP_URL", "https://ipapi.co"),
            catalog_path: var("CATALOG_PATH", "data/companies.json"),
        })
    }
}

fn invalid(key: &'static str, message: String) -> ConfigError {
    ConfigError::Invalid { key, message }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid {}", std::any::type_name::<T>())),
        None => Ok(default),
    }
}

fn parse_floats(raw: &str, key: &'static str, expected: usize) -> Result<Vec<f64>, ConfigError> {
    let parts = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(key, format!("{raw:?}: {e}")))?;
    if parts.len() != expected {
        return Err(invalid(
            key,
            format!("expected {expected} comma-separated numbers, got {raw:?}"),
        ));
    }
    Ok(parts)
}

/// `"lat,lon"` → coordinate; empty → no default (rejected later by validation).
fn parse_location(raw: &str) -> Result<Option<Coordinate>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let v = parse_floats(raw, "DEFAULT_LOCATION", 2)?;
    Coordinate::point(v[0], v[1])
        .map(Some)
        .map_err(|e| invalid("DEFAULT_LOCATION", e.to_string()))
}

/// `"min_lat,max_lat,min_lon,max_lon"`; empty disables the region gate.
fn parse_region(raw: &str) -> Result<Option<BoundingBox>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let v = parse_floats(raw, "SERVICE_REGION", 4)?;
    BoundingBox::new(v[0], v[1], v[2], v[3])
        .map(Some)
        .map_err(|e| invalid("SERVICE_REGION", e.to_string()))
}
