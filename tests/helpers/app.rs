//! Test helpers for running the full application against fake host services.

use anyhow::Result;
use hostwatch::{
    app::App,
    config::Config,
    core::{MetricsStore, ProbeStatus},
    internal_metrics::Metrics,
    sampler::SampleError,
    store::SqliteStore,
    test_utils::{FailingStore, FakeHostInfo, FakeProbe, FakeSampler},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::{sync::watch, task::JoinHandle, time::timeout};

/// A running application instance with a temporary database.
pub struct TestApp {
    pub shutdown_tx: watch::Sender<bool>,
    pub app_handle: Option<JoinHandle<Result<()>>>,
    pub store: Arc<SqliteStore>,
    pub sampler: FakeSampler,
    pub probe: FakeProbe,
    pub client: reqwest::Client,
    api_addr: SocketAddr,
    metrics_addr: Option<SocketAddr>,
    _db_dir: TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.api_addr, path)
    }

    pub fn api_addr(&self) -> SocketAddr {
        self.api_addr
    }

    pub fn metrics_addr(&self) -> SocketAddr {
        self.metrics_addr
            .expect("Metrics must be enabled to get the address")
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("request to test app failed")
    }

    /// Polls the store until it holds at least `count` samples.
    pub async fn wait_for_samples(&self, count: u64, within: Duration) -> Result<()> {
        timeout(within, async {
            loop {
                if self.store.count().await.unwrap_or(0) >= count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .map_err(|_| anyhow::anyhow!("store never reached {} samples", count))
    }

    /// Shuts down the application and waits for it to terminate.
    pub async fn shutdown(self, timeout_duration: Duration) -> Result<()> {
        self.shutdown_tx
            .send(true)
            .expect("Failed to send shutdown signal");

        if let Some(handle) = self.app_handle {
            match timeout(timeout_duration, handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(anyhow::anyhow!("App failed to shut down within the timeout")),
            }
        } else {
            Ok(())
        }
    }
}

/// Builds `TestApp` instances.
///
/// By default the collector's first tick fails and the next one is an hour
/// away, so the store holds exactly what the test seeds.
pub struct TestAppBuilder {
    pub config: Config,
    sampler: FakeSampler,
    probe_status: ProbeStatus,
    idle_collector: bool,
    failing_store: bool,
    metrics: Option<Metrics>,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        let mut config = Config::default();
        config.server.listen_address = "127.0.0.1:0".parse().unwrap();
        config.collector.interval_seconds = 3600;
        config.alerts.enabled = false;
        config.metrics.enabled = false;

        Self {
            config,
            sampler: FakeSampler::new(),
            probe_status: ProbeStatus::Online,
            idle_collector: true,
            failing_store: false,
            metrics: Some(Metrics::disabled()),
        }
    }

    /// Lets the collector persist samples every `interval_seconds`.
    pub fn with_live_collector(mut self, interval_seconds: u64) -> Self {
        self.config.collector.interval_seconds = interval_seconds;
        self.idle_collector = false;
        self
    }

    /// Serves the API from a store whose every operation fails. `TestApp::store`
    /// is then a separate, untouched database.
    pub fn with_failing_store(mut self) -> Self {
        self.failing_store = true;
        self
    }

    pub fn with_probe_status(mut self, status: ProbeStatus) -> Self {
        self.probe_status = status;
        self
    }

    pub fn with_config_modifier(mut self, modifier: impl FnOnce(&mut Config)) -> Self {
        modifier(&mut self.config);
        self
    }

    /// Serves real Prometheus metrics on an ephemeral port.
    pub fn with_metrics_server(mut self) -> Self {
        self.config.metrics.enabled = true;
        self.config.metrics.listen_address = "127.0.0.1:0".parse().unwrap();
        self.metrics = None;
        self
    }

    pub async fn start(self) -> Result<TestApp> {
        let db_dir = tempfile::tempdir()?;
        let store = Arc::new(SqliteStore::open(db_dir.path().join("metrics.db"), 2).await?);

        if self.idle_collector {
            self.sampler.fail_next(SampleError::AllCountersUnavailable);
        }
        let probe = FakeProbe::new(self.probe_status);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let app_store: Arc<dyn MetricsStore> = if self.failing_store {
            Arc::new(FailingStore)
        } else {
            store.clone()
        };
        let mut builder = App::builder(self.config)
            .store_override(app_store)
            .sampler_override(Box::new(self.sampler.clone()))
            .host_override(Arc::new(FakeHostInfo))
            .probe_override(Arc::new(probe.clone()));
        if let Some(metrics) = self.metrics {
            builder = builder.metrics_override(metrics);
        }

        let app = builder.build(shutdown_rx).await?;
        let api_addr = app.api_addr();
        let metrics_addr = app.metrics_addr();
        let app_handle = tokio::spawn(app.run());

        Ok(TestApp {
            shutdown_tx,
            app_handle: Some(app_handle),
            store,
            sampler: self.sampler,
            probe,
            client: reqwest::Client::new(),
            api_addr,
            metrics_addr,
            _db_dir: db_dir,
        })
    }
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}
