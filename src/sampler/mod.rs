//! Host resource sampling.
//!
//! A tick reads each counter independently into [`CounterReadings`] and then
//! assembles a [`Sample`]. A counter that fails is reported as absent for the
//! tick; only when every counter fails is the whole sample rejected.

pub mod system;

use crate::core::{DiskPartition, Sample};
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use system::{
    PartitionList, PartitionSource, SysinfoHostInfo, SysinfoSampler, DEFAULT_DISK_TIMEOUT,
};

/// Mountpoints under this prefix are read-only squashfs images, not storage.
const SKIPPED_MOUNT_PREFIX: &str = "/snap";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("counter '{counter}' unavailable: {reason}")]
    Unavailable { counter: &'static str, reason: String },

    #[error("no resource counter could be read")]
    AllCountersUnavailable,

    #[error("sampler is still busy with a previous tick")]
    Busy,

    #[error("sampling did not finish within {0:?}")]
    Timeout(std::time::Duration),

    #[error("sampling task failed: {0}")]
    TaskFailed(String),
}

/// CPU utilization as read on one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuReading {
    pub overall: f64,
    pub per_core: Vec<f64>,
}

/// Cumulative network byte counters summed over all interfaces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkTotals {
    pub sent: u64,
    pub recv: u64,
}

/// Raw capacity figures for one mounted filesystem.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionReading {
    pub mountpoint: String,
    pub device: String,
    pub total: u64,
    pub available: u64,
}

/// The individual counter reads of a single tick, each of which may fail.
#[derive(Debug, Clone)]
pub struct CounterReadings {
    pub cpu: Result<CpuReading, SampleError>,
    pub memory: Result<f64, SampleError>,
    pub disks: Result<Vec<Result<PartitionReading, SampleError>>, SampleError>,
    pub network: Result<NetworkTotals, SampleError>,
}

impl CounterReadings {
    /// Assembles a sample, dropping whatever could not be read.
    ///
    /// # Returns
    /// * `Ok(Sample)` when at least one counter produced a value
    /// * `Err(SampleError::AllCountersUnavailable)` otherwise
    pub fn into_sample(self, timestamp: DateTime<Utc>) -> Result<Sample, SampleError> {
        let mut sample = Sample::empty(timestamp);
        let mut any_read = false;

        match self.cpu.and_then(|cpu| {
            let overall = clamp_percent("cpu", cpu.overall)?;
            let per_core = cpu
                .per_core
                .into_iter()
                .map(|core| clamp_percent("cpu", core))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((overall, per_core))
        }) {
            Ok((overall, per_core)) => {
                sample.cpu_percent = Some(overall);
                sample.cpu_per_core = per_core;
                any_read = true;
            }
            Err(e) => tracing::warn!(error = %e, "CPU counter skipped for this tick"),
        }

        match self.memory.and_then(|memory| clamp_percent("memory", memory)) {
            Ok(memory) => {
                sample.memory_percent = Some(memory);
                any_read = true;
            }
            Err(e) => tracing::warn!(error = %e, "Memory counter skipped for this tick"),
        }

        match self.disks {
            Ok(partitions) => {
                any_read = true;
                for partition in partitions {
                    let partition = match partition {
                        Ok(partition) => partition,
                        Err(e) => {
                            tracing::debug!(error = %e, "Partition omitted from sample");
                            continue;
                        }
                    };
                    if partition.mountpoint.starts_with(SKIPPED_MOUNT_PREFIX) {
                        continue;
                    }
                    if let Some(details) = DiskPartition::from_space(
                        &partition.mountpoint,
                        &partition.device,
                        partition.total,
                        partition.available,
                    ) {
                        sample.disk_details.push(details);
                    }
                }
                sample.disk_percent = sample
                    .disk_details
                    .iter()
                    .find(|d| d.mountpoint == "/")
                    .map(|d| d.percent);
            }
            Err(e) => tracing::warn!(error = %e, "Disk counters skipped for this tick"),
        }

        match self.network {
            Ok(totals) => {
                sample.net_sent = Some(totals.sent);
                sample.net_recv = Some(totals.recv);
                any_read = true;
            }
            Err(e) => tracing::warn!(error = %e, "Network counters skipped for this tick"),
        }

        if any_read {
            Ok(sample)
        } else {
            Err(SampleError::AllCountersUnavailable)
        }
    }
}

/// Clamps a percentage into 0..=100. A NaN or infinite reading makes the
/// counter unavailable.
fn clamp_percent(counter: &'static str, value: f64) -> Result<f64, SampleError> {
    if value.is_finite() {
        Ok(value.clamp(0.0, 100.0))
    } else {
        Err(SampleError::Unavailable {
            counter,
            reason: format!("non-finite reading {}", value),
        })
    }
}
