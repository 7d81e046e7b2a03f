//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged with
//! the configuration from the `hostwatch.toml` file and environment variables.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::net::SocketAddr;
use std::path::PathBuf;

/// A single-host resource monitor with a persisted metrics history.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address for the HTTP API.
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<SocketAddr>,

    /// Path of the SQLite sample database.
    #[arg(long, value_name = "FILE")]
    pub db_path: Option<PathBuf>,

    /// Seconds between two collector ticks.
    #[arg(long, value_name = "SECONDS")]
    pub interval: Option<u64>,

    /// URL of the external service to probe by default.
    #[arg(long, value_name = "URL")]
    pub probe_url: Option<String>,

    /// Logging filter, e.g. `debug` or `hostwatch=trace`.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Serve internal Prometheus metrics.
    #[arg(long)]
    pub metrics: bool,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut server = Dict::new();
        if let Some(listen) = self.listen {
            server.insert("listen_address".into(), Value::from(listen.to_string()));
        }

        let mut storage = Dict::new();
        if let Some(path) = &self.db_path {
            storage.insert("path".into(), Value::from(path.to_string_lossy().into_owned()));
        }

        let mut collector = Dict::new();
        if let Some(interval) = self.interval {
            collector.insert("interval_seconds".into(), Value::from(interval));
        }

        let mut probe = Dict::new();
        if let Some(url) = &self.probe_url {
            probe.insert("target_url".into(), Value::from(url.clone()));
        }

        let mut metrics = Dict::new();
        // Only an explicit flag overrides the file; absence leaves it untouched.
        if self.metrics {
            metrics.insert("enabled".into(), Value::from(true));
        }

        let mut dict = Dict::new();
        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }
        for (section, values) in [
            ("server", server),
            ("storage", storage),
            ("collector", collector),
            ("probe", probe),
            ("metrics", metrics),
        ] {
            if !values.is_empty() {
                dict.insert(section.into(), Value::from(values));
            }
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
