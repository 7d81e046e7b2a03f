//! On-demand reachability check of an external HTTP service.
//!
//! The probe sends a single `HEAD` request without following redirects. A
//! healthy Odoo instance answers its root URL with a redirect to `/web`;
//! anything else is reported as an error, and transport failures as offline.

use crate::config::ProbeConfig;
use crate::core::{HealthProbe, ProbeResult, ProbeStatus};
use crate::internal_metrics::Metrics;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header::LOCATION, redirect, Client, StatusCode};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Path the service is expected to redirect to when healthy.
const EXPECTED_REDIRECT_PATH: &str = "/web";

/// Statuses treated as a redirect. 300, 304 and 305 are not.
const REDIRECT_STATUSES: [StatusCode; 5] = [
    StatusCode::MOVED_PERMANENTLY,
    StatusCode::FOUND,
    StatusCode::SEE_OTHER,
    StatusCode::TEMPORARY_REDIRECT,
    StatusCode::PERMANENT_REDIRECT,
];

/// A [`HealthProbe`] backed by `reqwest`.
pub struct HttpProbe {
    client: Client,
    metrics: Arc<Metrics>,
}

impl HttpProbe {
    /// Creates a new `HttpProbe` from configuration.
    pub fn new(config: &ProbeConfig, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;
        Ok(Self { client, metrics })
    }

    fn result(
        url: &str,
        status: ProbeStatus,
        message: String,
        elapsed: Option<Duration>,
        redirect_location: Option<String>,
    ) -> ProbeResult {
        ProbeResult {
            url: url.to_string(),
            status,
            message,
            response_time_ms: elapsed.map(round_millis),
            redirect_location,
            checked_at: Utc::now(),
        }
    }
}

/// Milliseconds rounded to two decimals.
fn round_millis(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}

#[async_trait]
impl HealthProbe for HttpProbe {
    #[instrument(skip(self))]
    async fn check(&self, url: &str) -> ProbeResult {
        let start = Instant::now();
        let result = match self.client.head(url).send().await {
            Ok(response) => {
                let elapsed = start.elapsed();
                let status = response.status();
                if REDIRECT_STATUSES.contains(&status) {
                    let location = response
                        .headers()
                        .get(LOCATION)
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    if location.contains(EXPECTED_REDIRECT_PATH) {
                        Self::result(
                            url,
                            ProbeStatus::Online,
                            "Service is responding normally".to_string(),
                            Some(elapsed),
                            Some(location),
                        )
                    } else {
                        Self::result(
                            url,
                            ProbeStatus::Error,
                            format!("Unexpected redirect location: {}", location),
                            Some(elapsed),
                            Some(location),
                        )
                    }
                } else {
                    Self::result(
                        url,
                        ProbeStatus::Error,
                        format!("Unexpected status code: {}", status.as_u16()),
                        Some(elapsed),
                        None,
                    )
                }
            }
            Err(e) if e.is_timeout() => Self::result(
                url,
                ProbeStatus::Offline,
                "Connection timeout".to_string(),
                None,
                None,
            ),
            Err(e) if e.is_connect() => Self::result(
                url,
                ProbeStatus::Offline,
                format!("Connection failed: {}", e),
                None,
                None,
            ),
            Err(e) => Self::result(url, ProbeStatus::Error, format!("Error: {}", e), None, None),
        };

        match result.status {
            ProbeStatus::Online => debug!(status = result.status.as_str(), "Probe completed"),
            _ => warn!(status = result.status.as_str(), message = %result.message, "Probe reported a problem"),
        }
        self.metrics.increment_probe_check(result.status.as_str());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_millis_keeps_two_decimals() {
        assert_eq!(round_millis(Duration::from_micros(12_346)), 12.35);
        assert_eq!(round_millis(Duration::from_millis(3)), 3.0);
    }

    #[test]
    fn test_probe_status_serializes_lowercase() {
        let json = serde_json::to_string(&ProbeStatus::Offline).unwrap();
        assert_eq!(json, "\"offline\"");
    }
}
