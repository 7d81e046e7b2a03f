//! Fakes for the service traits, shared by unit and integration tests.

use crate::core::{
    HealthProbe, HostInfo, MetricsStore, ProbeResult, ProbeStatus, Sample, Sampler, SystemInfo,
};
use crate::sampler::SampleError;
use crate::store::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A sampler returning deterministic samples, with scriptable failures.
#[derive(Clone, Default)]
pub struct FakeSampler {
    failures: Arc<Mutex<VecDeque<SampleError>>>,
    collected: Arc<Mutex<u64>>,
    delay: Option<Duration>,
}

impl FakeSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `collect` sleep for `delay` first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues an error for the next `collect` call.
    pub fn fail_next(&self, error: SampleError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Number of samples successfully produced.
    pub fn collected(&self) -> u64 {
        *self.collected.lock().unwrap()
    }
}

impl Sampler for FakeSampler {
    fn collect(&mut self) -> Result<Sample, SampleError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let mut collected = self.collected.lock().unwrap();
        *collected += 1;
        Ok(sample_at(Utc::now(), (*collected % 100) as f64))
    }
}

/// Builds a fully populated sample with the given CPU reading.
pub fn sample_at(timestamp: DateTime<Utc>, cpu_percent: f64) -> Sample {
    Sample {
        cpu_percent: Some(cpu_percent),
        cpu_per_core: vec![cpu_percent, cpu_percent],
        memory_percent: Some(40.0),
        disk_percent: Some(50.0),
        net_sent: Some(1_000),
        net_recv: Some(2_000),
        disk_details: vec![crate::core::DiskPartition::from_space("/", "/dev/fake0", 1_000, 500)
            .expect("non-zero capacity")],
        ..Sample::empty(timestamp)
    }
}

/// Host facts with fixed values.
#[derive(Debug, Default, Clone, Copy)]
pub struct FakeHostInfo;

impl HostInfo for FakeHostInfo {
    fn system_info(&self) -> SystemInfo {
        SystemInfo {
            hostname: "test-host".to_string(),
            platform: "Linux".to_string(),
            os_version: Some("Linux 6.0 Test".to_string()),
            uptime_seconds: 3600,
            cpu_count: 4,
            memory_total: 8 * 1024 * 1024 * 1024,
        }
    }
}

/// A probe answering with a fixed status and recording the URLs it saw.
#[derive(Clone)]
pub struct FakeProbe {
    status: ProbeStatus,
    pub checked: Arc<Mutex<Vec<String>>>,
}

impl FakeProbe {
    pub fn new(status: ProbeStatus) -> Self {
        Self {
            status,
            checked: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl HealthProbe for FakeProbe {
    async fn check(&self, url: &str) -> ProbeResult {
        self.checked.lock().unwrap().push(url.to_string());
        ProbeResult {
            url: url.to_string(),
            status: self.status,
            message: format!("fake probe: {}", self.status.as_str()),
            response_time_ms: Some(1.0),
            redirect_location: None,
            checked_at: Utc::now(),
        }
    }
}

/// A store whose every operation fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingStore;

fn simulated() -> StorageError {
    StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, "simulated disk failure"))
}

#[async_trait]
impl MetricsStore for FailingStore {
    async fn append(&self, _sample: &Sample) -> Result<(), StorageError> {
        Err(simulated())
    }

    async fn query_range(&self, _since: DateTime<Utc>) -> Result<Vec<Sample>, StorageError> {
        Err(simulated())
    }

    async fn latest(&self) -> Result<Option<Sample>, StorageError> {
        Err(simulated())
    }

    async fn purge_before(&self, _cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        Err(simulated())
    }
}
