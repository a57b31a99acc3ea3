use std::path::Path;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::config::ConfigError;
use crate::geo::Coordinate;

/// A business listing with a known position. Never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocatedEntity {
    pub id: String,
    pub coordinate: Coordinate,
    /// Everything else the catalog carries (name, industry, open positions, ...).
    pub payload: Value,
}

/// Read-only set of located entities, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entities: Vec<LocatedEntity>,
}

impl Catalog {
    pub fn new(entities: Vec<LocatedEntity>) -> Self {
        Self { entities }
    }

    pub fn entities(&self) -> &[LocatedEntity] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Catalog {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        let catalog = Self::from_json_str(&raw)?;
        info!(entities = catalog.len(), path = %path.display(), "Loaded catalog");
        Ok(catalog)
    }

    /// Parses `[{ "id", "latitude", "longitude", ...payload }]`.
    /// Numeric ids are accepted and stringified.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let records: Vec<Map<String, Value>> =
            serde_json::from_str(raw).map_err(|e| ConfigError::Catalog {
                message: format!("invalid catalog JSON: {e}"),
            })?;

        let entities = records
            .into_iter()
            .enumerate()
            .map(|(index, record)| parse_record(index, record))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entities })
    }
}

fn parse_record(
    index: usize,
    mut record: Map<String, Value>,
) -> Result<LocatedEntity, ConfigError> {
    let invalid = |message: String| ConfigError::Catalog {
        message: format!("record {index}: {message}"),
    };

    let id = match record.remove("id") {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(invalid("missing id".to_string())),
    };

    let latitude = record
        .remove("latitude")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| invalid(format!("{id} has no numeric latitude")))?;
    let longitude = record
        .remove("longitude")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| invalid(format!("{id} has no numeric longitude")))?;

    let coordinate =
        Coordinate::point(latitude, longitude).map_err(|e| invalid(format!("{id}: {e}")))?;

    Ok(LocatedEntity {
        id,
        coordinate,
        payload: Value::Object(record),
    })
}
