use std::sync::Arc;

use crate::location::providers::IpApiProvider;
use crate::proximity::Catalog;
use crate::session::JobMapEngine;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<JobMapEngine>,
    pub catalog: Arc<Catalog>,
    /// Network positioning tier; scoped to the caller's address per session.
    /// `None` disables the tier (sessions fall straight through to the default).
    pub ip_lookup: Option<IpApiProvider>,
}
