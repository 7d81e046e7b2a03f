//! Configuration management for HostWatch
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer defaults, a `hostwatch.toml` file, environment variables
//! and command-line arguments.

use crate::cli::Cli;
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "hostwatch.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level (an `EnvFilter` directive) for the application.
    pub log_level: String,
    /// Configuration for the query API server.
    pub server: ServerConfig,
    /// Configuration for the sample database.
    pub storage: StorageConfig,
    /// Configuration for the collector loop.
    pub collector: CollectorConfig,
    /// Configuration for the external health probe.
    pub probe: ProbeConfig,
    /// Configuration for threshold evaluation.
    pub alerts: AlertsConfig,
    /// Configuration for the internal Prometheus endpoint.
    pub metrics: MetricsConfig,
}

/// Configuration for the query API server.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address the HTTP API binds to.
    pub listen_address: SocketAddr,
}

/// Configuration for the sample database.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    /// Path of the SQLite database file.
    pub path: PathBuf,
    /// Upper bound on pooled database connections.
    pub max_connections: u32,
}

/// Configuration for the collector loop.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CollectorConfig {
    /// Seconds between two ticks.
    pub interval_seconds: u64,
    /// Run the retention sweep every this many ticks.
    pub purge_every_ticks: u64,
    /// Maximum time a whole sample may take, in milliseconds.
    pub sample_timeout_ms: u64,
    /// Maximum time the filesystem scan may take, in milliseconds. Must be
    /// shorter than `sample_timeout_ms`.
    pub disk_timeout_ms: u64,
}

impl CollectorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }

    pub fn disk_timeout(&self) -> Duration {
        Duration::from_millis(self.disk_timeout_ms)
    }
}

/// Configuration for the external health probe.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProbeConfig {
    /// URL probed when a request does not name one.
    pub target_url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
    /// Whether to accept self-signed or otherwise invalid TLS certificates.
    pub accept_invalid_certs: bool,
}

/// Configuration for threshold evaluation.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AlertsConfig {
    /// Whether the periodic evaluation task runs.
    pub enabled: bool,
    /// Seconds between two periodic evaluations.
    pub check_interval_seconds: u64,
    /// Trailing window averaged for CPU and memory, in minutes.
    pub window_minutes: u64,
    pub cpu_threshold: f64,
    pub memory_threshold: f64,
    pub disk_threshold: f64,
    /// Mountpoints checked against `disk_threshold`.
    pub monitored_mountpoints: Vec<String>,
}

/// Configuration for the internal metrics server.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MetricsConfig {
    /// Whether the Prometheus endpoint is served.
    pub enabled: bool,
    /// Address of the Prometheus endpoint.
    pub listen_address: SocketAddr,
}

impl Config {
    /// Loads the application configuration.
    ///
    /// Sources are merged in increasing priority: built-in defaults, the TOML
    /// file named by `--config` (or `hostwatch.toml`), `HOSTWATCH_`-prefixed
    /// environment variables (`__` separates nested keys), and finally the
    /// command-line arguments.
    pub fn load(cli: &Cli) -> Result<Self> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            // Older deployments export the probe target under this name.
            .merge(Env::raw().only(&["ODOO_MONITOR_URL"]).map(|_| "probe.target_url".into()))
            .merge(Env::prefixed("HOSTWATCH_").split("__"))
            .merge(cli)
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the application cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.collector.interval_seconds == 0 {
            bail!("collector.interval_seconds must be at least 1");
        }
        if self.collector.purge_every_ticks == 0 {
            bail!("collector.purge_every_ticks must be at least 1");
        }
        if self.collector.sample_timeout_ms == 0 {
            bail!("collector.sample_timeout_ms must be at least 1");
        }
        if self.collector.disk_timeout_ms == 0
            || self.collector.disk_timeout_ms >= self.collector.sample_timeout_ms
        {
            bail!(
                "collector.disk_timeout_ms must be between 1 and sample_timeout_ms ({}), got {}",
                self.collector.sample_timeout_ms,
                self.collector.disk_timeout_ms
            );
        }
        if self.storage.max_connections == 0 {
            bail!("storage.max_connections must be at least 1");
        }
        if self.probe.timeout_seconds == 0 {
            bail!("probe.timeout_seconds must be at least 1");
        }
        if self.alerts.check_interval_seconds == 0 || self.alerts.window_minutes == 0 {
            bail!("alerts.check_interval_seconds and alerts.window_minutes must be at least 1");
        }
        for (name, value) in [
            ("cpu_threshold", self.alerts.cpu_threshold),
            ("memory_threshold", self.alerts.memory_threshold),
            ("disk_threshold", self.alerts.disk_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                bail!("alerts.{} must be between 0 and 100, got {}", name, value);
            }
        }
        Ok(())
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            server: ServerConfig {
                listen_address: SocketAddr::from(([0, 0, 0, 0], 8004)),
            },
            storage: StorageConfig {
                path: PathBuf::from("metrics.db"),
                max_connections: 5,
            },
            collector: CollectorConfig {
                interval_seconds: 5,
                purge_every_ticks: 720,
                sample_timeout_ms: 2000,
                disk_timeout_ms: 1000,
            },
            probe: ProbeConfig {
                target_url: None,
                timeout_seconds: 10,
                accept_invalid_certs: true,
            },
            alerts: AlertsConfig {
                enabled: true,
                check_interval_seconds: 900,
                window_minutes: 15,
                cpu_threshold: 95.0,
                memory_threshold: 90.0,
                disk_threshold: 95.0,
                monitored_mountpoints: vec![
                    "/".to_string(),
                    "/boot/efi".to_string(),
                    "/mnt".to_string(),
                    "/mnt/data".to_string(),
                ],
            },
            metrics: MetricsConfig {
                enabled: false,
                listen_address: SocketAddr::from(([127, 0, 0, 1], 9090)),
            },
        }
    }
}
