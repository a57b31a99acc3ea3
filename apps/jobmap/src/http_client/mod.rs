//! HTTP client shared by every network-backed capability (geocoder, IP positioning).
//!
//! Third-party geo services are rate limited and flaky; all calls go through
//! here so timeouts, identification and retry behaviour stay consistent.
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

/// Nominatim's usage policy requires an identifying User-Agent.
pub const USER_AGENT: &str = concat!("jobmap/", env!("CARGO_PKG_VERSION"), " (job map)");
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_MS: u64 = 250;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Service returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

impl HttpError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HttpError::Transport(e) if e.is_timeout())
    }
}

#[derive(Clone)]
pub struct GeoHttpClient {
    client: Client,
}

impl GeoHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    /// GET `url` with `query` parameters and decode the JSON body.
    /// Retries on 429 and 5xx with exponential backoff: 250ms, 500ms.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, HttpError> {
        let mut last_error: Option<HttpError> = None;

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                let delay = Duration::from_millis(BACKOFF_BASE_MS * (1 << (attempt - 1)));
                let delay_ms = delay.as_millis() as u64;
                warn!(%url, attempt, delay_ms, "Retrying upstream request");
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .get(url)
                .header("accept", "application/json")
                .query(query)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                // A timed-out request is not retried; the caller's own deadline is near.
                Err(e) if e.is_timeout() => return Err(HttpError::Transport(e)),
                Err(e) => {
                    last_error = Some(HttpError::Transport(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!(%url, %status, body = %body, "Upstream returned an error status");
                last_error = Some(HttpError::Status {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(HttpError::Status {
                    status: status.as_u16(),
                    message: body,
                });
            }

            let decoded: T = response.json().await?;
            debug!(%url, attempts = attempt + 1, "Upstream request succeeded");
            return Ok(decoded);
        }

        Err(last_error.unwrap_or(HttpError::Exhausted {
            attempts: MAX_ATTEMPTS,
        }))
    }
}
