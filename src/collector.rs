//! The collector loop: sample, persist, and periodically expire old samples.
//!
//! Each tick moves through `Idle -> Sampling -> Persisting -> (Idle |
//! Purging -> Idle)`. A failed tick is logged and skipped; the next
//! scheduled tick is the retry. The loop is fixed-rate: ticks missed while a
//! slow tick was running are dropped rather than queued.

use crate::config::CollectorConfig;
use crate::core::{MetricsStore, Sample, Sampler};
use crate::internal_metrics::Metrics;
use crate::sampler::SampleError;
use crate::store::{StorageError, RETENTION_HORIZON};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

const NEVER_PURGED: u64 = u64::MAX;

/// Phase of the collector state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Sampling,
    Persisting,
    Purging,
}

/// Result of a single tick.
#[derive(Debug)]
pub enum TickOutcome {
    /// The sample was written. `purged` is set when a retention sweep ran.
    Persisted { purged: Option<u64> },
    /// No sample could be taken; nothing was written.
    SampleFailed(SampleError),
    /// The sample was taken but could not be written and is lost.
    StoreFailed(StorageError),
}

impl TickOutcome {
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Persisted { .. } => "persisted",
            Self::SampleFailed(_) => "sample_failed",
            Self::StoreFailed(_) => "store_failed",
        }
    }
}

/// Periodically samples the host and appends the result to a store.
pub struct Collector {
    sampler: Arc<Mutex<Box<dyn Sampler>>>,
    store: Arc<dyn MetricsStore>,
    metrics: Arc<Metrics>,
    interval: Duration,
    purge_every_ticks: u64,
    sample_timeout: Duration,
    ticks: AtomicU64,
    last_purge_tick: AtomicU64,
    state_tx: watch::Sender<CollectorState>,
}

impl Collector {
    /// Creates a collector with the default cadence (5 s ticks, hourly purge).
    pub fn new(
        sampler: Box<dyn Sampler>,
        store: Arc<dyn MetricsStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (state_tx, _) = watch::channel(CollectorState::Idle);
        Self {
            sampler: Arc::new(Mutex::new(sampler)),
            store,
            metrics,
            interval: Duration::from_secs(5),
            purge_every_ticks: 720,
            sample_timeout: Duration::from_secs(2),
            ticks: AtomicU64::new(0),
            last_purge_tick: AtomicU64::new(NEVER_PURGED),
            state_tx,
        }
    }

    /// Applies the cadence settings from configuration.
    pub fn with_config(self, config: &CollectorConfig) -> Self {
        self.with_interval(config.interval())
            .with_purge_every_ticks(config.purge_every_ticks)
            .with_sample_timeout(config.sample_timeout())
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Runs the retention sweep on the first persisted tick and then once at
    /// least `ticks` ticks have passed since the last successful sweep.
    pub fn with_purge_every_ticks(mut self, ticks: u64) -> Self {
        self.purge_every_ticks = ticks.max(1);
        self
    }

    pub fn with_sample_timeout(mut self, timeout: Duration) -> Self {
        self.sample_timeout = timeout;
        self
    }

    /// Returns a receiver observing state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<CollectorState> {
        self.state_tx.subscribe()
    }

    /// Number of ticks started so far.
    pub fn ticks_run(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn set_state(&self, state: CollectorState) {
        self.state_tx.send_replace(state);
    }

    /// Performs one sample-and-persist cycle.
    pub async fn tick(&self) -> TickOutcome {
        let start = Instant::now();
        let tick_number = self.ticks.fetch_add(1, Ordering::Relaxed);

        let outcome = self.run_cycle(tick_number).await;

        self.set_state(CollectorState::Idle);
        self.metrics.record_tick(outcome.label(), start.elapsed());
        outcome
    }

    async fn run_cycle(&self, tick_number: u64) -> TickOutcome {
        self.set_state(CollectorState::Sampling);
        let sample = match self.sample().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!(tick = tick_number, error = %e, "Sampling failed, skipping tick");
                return TickOutcome::SampleFailed(e);
            }
        };

        self.set_state(CollectorState::Persisting);
        if let Err(e) = self.store.append(&sample).await {
            error!(tick = tick_number, error = %e, "Failed to persist sample, it is lost");
            return TickOutcome::StoreFailed(e);
        }
        debug!(tick = tick_number, timestamp = %sample.timestamp, "Sample persisted");

        let purged = if self.purge_due(tick_number) {
            self.set_state(CollectorState::Purging);
            let purged = self.purge().await;
            if purged.is_some() {
                self.last_purge_tick.store(tick_number, Ordering::Relaxed);
            }
            purged
        } else {
            None
        };

        TickOutcome::Persisted { purged }
    }

    fn purge_due(&self, tick_number: u64) -> bool {
        match self.last_purge_tick.load(Ordering::Relaxed) {
            NEVER_PURGED => true,
            last => tick_number.saturating_sub(last) >= self.purge_every_ticks,
        }
    }

    /// Reads the sampler on the blocking pool, bounded by the sample timeout.
    async fn sample(&self) -> Result<Sample, SampleError> {
        let sampler = Arc::clone(&self.sampler);
        let read = tokio::task::spawn_blocking(move || {
            let mut guard = match sampler.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::WouldBlock) => return Err(SampleError::Busy),
                // A panic in an earlier read leaves the handles usable.
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            };
            guard.collect()
        });

        match tokio::time::timeout(self.sample_timeout, read).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(SampleError::TaskFailed(e.to_string())),
            Err(_) => Err(SampleError::Timeout(self.sample_timeout)),
        }
    }

    async fn purge(&self) -> Option<u64> {
        match self.store.purge_older_than(RETENTION_HORIZON).await {
            Ok(deleted) => {
                if deleted > 0 {
                    info!(deleted, "Retention sweep removed expired samples");
                }
                self.metrics.increment_samples_purged(deleted);
                Some(deleted)
            }
            Err(e) => {
                error!(error = %e, "Retention sweep failed");
                None
            }
        }
    }

    /// Ticks at the configured interval until the shutdown signal.
    ///
    /// A tick in progress when the signal arrives is allowed to finish.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval = ?self.interval, "Collector loop started.");
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Collector received shutdown signal.");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
        info!("Collector loop finished.");
    }
}
