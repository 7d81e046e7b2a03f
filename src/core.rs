//! Core domain types and service traits for HostWatch
//!
//! This module defines the fundamental data structures and trait contracts
//! that govern component interactions throughout the application.

use crate::sampler::SampleError;
use crate::store::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One timestamped snapshot of host resource usage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// UTC instant the counters were read
    pub timestamp: DateTime<Utc>,
    /// Overall CPU utilization (0-100), absent if the counter could not be read
    pub cpu_percent: Option<f64>,
    /// Utilization of each logical core (0-100)
    #[serde(default)]
    pub cpu_per_core: Vec<f64>,
    /// Physical memory utilization (0-100)
    pub memory_percent: Option<f64>,
    /// Utilization of the root partition, when it was readable this tick
    pub disk_percent: Option<f64>,
    /// Cumulative bytes transmitted over all interfaces
    pub net_sent: Option<u64>,
    /// Cumulative bytes received over all interfaces
    pub net_recv: Option<u64>,
    /// Per-partition usage, one entry per readable mounted filesystem
    #[serde(default)]
    pub disk_details: Vec<DiskPartition>,
}

impl Sample {
    /// Creates a sample at `timestamp` with every counter absent.
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            cpu_percent: None,
            cpu_per_core: Vec::new(),
            memory_percent: None,
            disk_percent: None,
            net_sent: None,
            net_recv: None,
            disk_details: Vec::new(),
        }
    }

    /// Checks that every percentage is finite and within 0-100.
    ///
    /// # Returns
    /// * `Ok(())` if the sample may be persisted
    /// * `Err(String)` naming the first offending field
    pub fn validate(&self) -> Result<(), String> {
        fn check(field: &str, value: f64) -> Result<(), String> {
            if value.is_finite() && (0.0..=100.0).contains(&value) {
                Ok(())
            } else {
                Err(format!("{} out of range: {}", field, value))
            }
        }

        if let Some(cpu) = self.cpu_percent {
            check("cpu_percent", cpu)?;
        }
        for core in &self.cpu_per_core {
            check("cpu_per_core", *core)?;
        }
        if let Some(memory) = self.memory_percent {
            check("memory_percent", memory)?;
        }
        if let Some(disk) = self.disk_percent {
            check("disk_percent", disk)?;
        }
        for partition in &self.disk_details {
            check("disk_details.percent", partition.percent)?;
        }
        Ok(())
    }
}

/// Usage of a single mounted filesystem.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiskPartition {
    pub mountpoint: String,
    pub device: String,
    /// `used / total * 100`
    pub percent: f64,
    pub free_bytes: u64,
    pub total_bytes: u64,
    pub used_bytes: u64,
}

impl DiskPartition {
    /// Builds a partition record from raw capacity figures.
    ///
    /// Returns `None` for filesystems reporting zero total capacity.
    pub fn from_space(mountpoint: &str, device: &str, total: u64, available: u64) -> Option<Self> {
        if total == 0 {
            return None;
        }
        let used = total.saturating_sub(available);
        Some(Self {
            mountpoint: mountpoint.to_string(),
            device: device.to_string(),
            percent: used as f64 / total as f64 * 100.0,
            free_bytes: available.min(total),
            total_bytes: total,
            used_bytes: used,
        })
    }
}

/// Static facts about the host, computed on every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemInfo {
    pub hostname: String,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    pub uptime_seconds: u64,
    pub cpu_count: usize,
    pub memory_total: u64,
}

/// Outcome class of an external health probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Online,
    Offline,
    Error,
}

impl ProbeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Error => "error",
        }
    }
}

/// Result of one health probe against an external service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub url: String,
    pub status: ProbeStatus,
    pub message: String,
    pub response_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_location: Option<String>,
    pub checked_at: DateTime<Utc>,
}

// =============================================================================
// Service Traits
// =============================================================================

/// Reads instantaneous resource counters from the host.
pub trait Sampler: Send {
    /// Reads every counter and assembles a sample.
    ///
    /// # Returns
    /// * `Ok(Sample)` if at least one counter could be read
    /// * `Err(SampleError)` only if every counter failed
    fn collect(&mut self) -> Result<Sample, SampleError>;
}

/// Provides live, non-persisted facts about the host.
pub trait HostInfo: Send + Sync {
    fn system_info(&self) -> SystemInfo;
}

/// Persistent, append-only time series of samples.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Durably appends a sample.
    async fn append(&self, sample: &Sample) -> Result<(), StorageError>;

    /// Returns every sample with `timestamp >= since`, oldest first.
    async fn query_range(&self, since: DateTime<Utc>) -> Result<Vec<Sample>, StorageError>;

    /// Returns the most recent sample, or `None` before the first append.
    async fn latest(&self) -> Result<Option<Sample>, StorageError>;

    /// Deletes every sample with `timestamp < cutoff`, returning the count.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError>;

    /// Deletes every sample older than `horizon` relative to now.
    ///
    /// The cutoff is fixed before the delete runs, so samples appended
    /// concurrently are never removed.
    async fn purge_older_than(&self, horizon: Duration) -> Result<u64, StorageError> {
        let horizon = chrono::Duration::from_std(horizon)
            .map_err(|e| StorageError::InvalidHorizon(e.to_string()))?;
        self.purge_before(Utc::now() - horizon).await
    }
}

/// Checks reachability of an external HTTP service.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probes `url` once. Failures are reported in the result, never as `Err`.
    async fn check(&self, url: &str) -> ProbeResult;
}
