//! # Internal Metrics Module
//!
//! Process-level instrumentation of HostWatch itself, exposed in the
//! Prometheus text format. This is separate from the host samples the
//! collector persists.
//!
//! ## Components:
//!
//! - **`MetricsBuilder`**: installs the Prometheus recorder, binds the
//!   listener and constructs the `Metrics` handle.
//!
//! - **`Metrics`**: a cloneable handle with one method per metric the
//!   application updates.
//!
//! - **`MetricsServer`**: (Defined in `server.rs`) an `axum`-based web server
//!   exposing `/metrics` for Prometheus to scrape.

use crate::config::MetricsConfig;
use crate::internal_metrics::server::MetricsServer;
use metrics::{Histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::error;

pub mod server;

/// The public API for the metrics system.
#[derive(Clone)]
pub struct Metrics {
    tick_duration_seconds: Histogram,
    store_query_duration_seconds: Histogram,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Creates a new `Metrics` instance and registers descriptions for all
    /// supported metrics with the global recorder.
    pub fn new() -> Self {
        metrics::describe_counter!("collector_ticks_total", Unit::Count, "Collector ticks, labeled by outcome (persisted, sample_failed, store_failed).");
        metrics::describe_histogram!("collector_tick_duration_seconds", Unit::Seconds, "Time taken by one sample-and-persist cycle.");
        metrics::describe_counter!("samples_purged_total", Unit::Count, "Samples deleted by the retention sweep.");
        metrics::describe_gauge!("collector_last_success_timestamp_seconds", Unit::Seconds, "Unix time of the last persisted sample.");
        metrics::describe_histogram!("store_query_duration_seconds", Unit::Seconds, "Latency of read queries issued by the API.");
        metrics::describe_counter!("probe_checks_total", Unit::Count, "External health probes, labeled by resulting status.");
        metrics::describe_counter!("threshold_alerts_total", Unit::Count, "Threshold breaches found by the evaluator, labeled by metric.");

        Self {
            tick_duration_seconds: metrics::histogram!("collector_tick_duration_seconds"),
            store_query_duration_seconds: metrics::histogram!("store_query_duration_seconds"),
        }
    }

    /// Creates a `Metrics` instance that performs no operations.
    /// Used when metrics are disabled in the configuration.
    pub fn disabled() -> Self {
        Self {
            tick_duration_seconds: Histogram::noop(),
            store_query_duration_seconds: Histogram::noop(),
        }
    }

    /// Records the outcome and duration of one collector tick.
    pub fn record_tick(&self, outcome: &'static str, duration: Duration) {
        metrics::counter!("collector_ticks_total", "outcome" => outcome).increment(1);
        self.tick_duration_seconds.record(duration.as_secs_f64());
        if outcome == "persisted" {
            metrics::gauge!("collector_last_success_timestamp_seconds")
                .set(chrono::Utc::now().timestamp() as f64);
        }
    }

    /// Adds to the count of samples removed by retention.
    pub fn increment_samples_purged(&self, count: u64) {
        metrics::counter!("samples_purged_total").increment(count);
    }

    /// Records the latency of an API read against the store.
    pub fn record_store_query(&self, duration: Duration) {
        self.store_query_duration_seconds.record(duration.as_secs_f64());
    }

    /// Increments the probe counter for a specific status.
    pub fn increment_probe_check(&self, status: &'static str) {
        metrics::counter!("probe_checks_total", "status" => status).increment(1);
    }

    /// Increments the counter for a threshold breach.
    pub fn increment_threshold_alert(&self, metric: &'static str) {
        metrics::counter!("threshold_alerts_total", "metric" => metric).increment(1);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for the metrics system.
///
/// This builder is responsible for initializing the `PrometheusRecorder`,
/// binding the `MetricsServer` listener, and creating the `Metrics` handle.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    /// Creates a new `MetricsBuilder` with the given configuration.
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Initializes the metrics system and returns a `Metrics` handle and an
    /// optional `MetricsServer` with its bound address.
    ///
    /// If metrics are disabled, or the recorder cannot be installed, this
    /// returns a disabled `Metrics` instance and `None` for the server.
    pub fn build(
        self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Metrics, Option<(MetricsServer, SocketAddr)>) {
        if !self.config.enabled {
            return (Metrics::disabled(), None);
        }

        let recorder = match PrometheusBuilder::new().set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
        ) {
            Ok(builder) => builder.build_recorder(),
            Err(e) => {
                error!("Failed to configure Prometheus buckets: {}", e);
                return (Metrics::disabled(), None);
            }
        };
        let handle = recorder.handle();

        // Bind before installing the recorder so a busy port leaves metrics disabled.
        let listener = match std::net::TcpListener::bind(self.config.listen_address)
            .and_then(|listener| {
                listener.set_nonblocking(true)?;
                Ok(listener)
            }) {
            Ok(listener) => listener,
            Err(e) => {
                error!(
                    "Failed to bind metrics server to {}: {}",
                    self.config.listen_address, e
                );
                return (Metrics::disabled(), None);
            }
        };

        let (listener, addr) = match TcpListener::from_std(listener)
            .and_then(|listener| listener.local_addr().map(|addr| (listener, addr)))
        {
            Ok(pair) => pair,
            Err(e) => {
                error!("Failed to set up metrics listener: {}", e);
                return (Metrics::disabled(), None);
            }
        };

        if let Err(e) = metrics::set_global_recorder(recorder) {
            error!("Failed to install Prometheus recorder: {}", e);
            return (Metrics::disabled(), None);
        }

        let metrics = Metrics::new();
        let server = MetricsServer::new(listener, handle, shutdown_rx);
        (metrics, Some((server, addr)))
    }
}
