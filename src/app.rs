//! The main application logic, decoupled from the entry point.

use crate::{
    alerts::ThresholdEvaluator,
    api::{ApiServer, AppState},
    collector::Collector,
    config::Config,
    core::{HealthProbe, HostInfo, MetricsStore, Sampler},
    internal_metrics::{Metrics, MetricsBuilder},
    probe::HttpProbe,
    sampler::{SysinfoHostInfo, SysinfoSampler},
    store::SqliteStore,
    task_manager::TaskManager,
};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

/// A running application: its background tasks and the addresses it serves on.
pub struct App {
    task_manager: TaskManager,
    api_addr: SocketAddr,
    metrics_addr: Option<SocketAddr>,
    // Set when the app opened the database itself and must close it.
    owned_store: Option<SqliteStore>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// Address the query API is bound to.
    pub fn api_addr(&self) -> SocketAddr {
        self.api_addr
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    /// Waits for the shutdown signal, then for every task to finish.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.shutdown_rx();
        if !*shutdown_rx.borrow_and_update() {
            // An error means the sender is gone, which is also a shutdown.
            let _ = shutdown_rx.changed().await;
        }
        info!("Shutdown signal received. Waiting for tasks to complete...");

        self.task_manager.shutdown().await;

        if let Some(store) = self.owned_store {
            store.close().await;
            debug!("Sample database closed.");
        }
        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Every service can be replaced before `build`, which is how the
/// integration tests run the app without touching the real host.
pub struct AppBuilder {
    config: Config,
    store_override: Option<Arc<dyn MetricsStore>>,
    sampler_override: Option<Box<dyn Sampler>>,
    host_override: Option<Arc<dyn HostInfo>>,
    probe_override: Option<Arc<dyn HealthProbe>>,
    metrics_override: Option<Metrics>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store_override: None,
            sampler_override: None,
            host_override: None,
            probe_override: None,
            metrics_override: None,
        }
    }

    /// Uses `store` instead of opening the configured database.
    pub fn store_override(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.store_override = Some(store);
        self
    }

    /// Uses `sampler` instead of reading the host counters.
    pub fn sampler_override(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.sampler_override = Some(sampler);
        self
    }

    pub fn host_override(mut self, host: Arc<dyn HostInfo>) -> Self {
        self.host_override = Some(host);
        self
    }

    /// Uses `probe` instead of issuing real HTTP requests.
    pub fn probe_override(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe_override = Some(probe);
        self
    }

    /// Overrides the metrics system for testing.
    pub fn metrics_override(mut self, metrics: Metrics) -> Self {
        self.metrics_override = Some(metrics);
        self
    }

    /// Builds every component, spawns the background tasks and returns a
    /// runnable `App`.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = Arc::new(self.config);
        let task_manager = TaskManager::new(shutdown_rx);

        // Metrics
        let (metrics, metrics_server) = match self.metrics_override {
            Some(m) => (m, None),
            None => MetricsBuilder::new(config.metrics.clone()).build(task_manager.shutdown_rx()),
        };
        let metrics = Arc::new(metrics);
        let metrics_addr = metrics_server.map(|(server, addr)| {
            task_manager.spawn("MetricsServer", server.run());
            info!(%addr, "Metrics server listening");
            addr
        });

        // Store
        let (store, owned_store): (Arc<dyn MetricsStore>, Option<SqliteStore>) =
            match self.store_override {
                Some(store) => (store, None),
                None => {
                    let sqlite =
                        SqliteStore::open(&config.storage.path, config.storage.max_connections)
                            .await
                            .with_context(|| {
                                format!(
                                    "failed to open sample database at {}",
                                    config.storage.path.display()
                                )
                            })?;
                    (Arc::new(sqlite.clone()), Some(sqlite))
                }
            };

        // Host access
        let sampler = match self.sampler_override {
            Some(sampler) => sampler,
            None => Box::new(SysinfoSampler::new().with_disk_timeout(config.collector.disk_timeout()))
                as Box<dyn Sampler>,
        };
        let host = match self.host_override {
            Some(host) => host,
            None => Arc::new(SysinfoHostInfo) as Arc<dyn HostInfo>,
        };
        let probe = match self.probe_override {
            Some(probe) => probe,
            None => Arc::new(HttpProbe::new(&config.probe, metrics.clone())?) as Arc<dyn HealthProbe>,
        };

        // Query API listener
        let listener = TcpListener::bind(config.server.listen_address)
            .await
            .with_context(|| format!("failed to bind API to {}", config.server.listen_address))?;
        let api_addr = listener.local_addr()?;

        // Collector
        let collector = Arc::new(
            Collector::new(sampler, store.clone(), metrics.clone()).with_config(&config.collector),
        );
        task_manager.spawn("Collector", collector.clone().run(task_manager.shutdown_rx()));

        // Threshold evaluation
        let evaluator = Arc::new(ThresholdEvaluator::new(
            store.clone(),
            config.alerts.clone(),
            metrics.clone(),
        ));
        if config.alerts.enabled {
            task_manager.spawn(
                "ThresholdEvaluator",
                evaluator.clone().run(task_manager.shutdown_rx()),
            );
        } else {
            debug!("Periodic threshold evaluation disabled");
        }

        // Serve
        let state = AppState {
            store,
            host,
            probe,
            evaluator,
            metrics,
            config: config.clone(),
        };
        task_manager.spawn(
            "ApiServer",
            ApiServer::new(listener, state, task_manager.shutdown_rx()).run(),
        );
        info!(%api_addr, "Query API listening");

        Ok(App {
            task_manager,
            api_addr,
            metrics_addr,
            owned_store,
        })
    }
}
