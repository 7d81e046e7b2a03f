//! # System Sampler
//!
//! This module defines the `sysinfo`-backed implementations of the
//! [`Sampler`] and [`HostInfo`] traits.
//!
//! The `SysinfoSampler` keeps its `System`, `Disks` and `Networks` handles
//! alive between ticks: CPU utilization is computed by `sysinfo` as the delta
//! since the previous refresh, so the first reading after construction is
//! only meaningful once a full collection interval has elapsed.
//!
//! Listing filesystems can block indefinitely (a stale network mount stalls
//! `statvfs`), so the disk read runs on its own thread behind its own lock
//! and is abandoned after `disk_timeout`. The tick then carries CPU, memory
//! and network without partitions, and later ticks report the disk counter
//! as busy until the stuck read returns.

use super::{CounterReadings, CpuReading, NetworkTotals, PartitionReading, SampleError};
use crate::core::{HostInfo, Sample, Sampler, SystemInfo};
use chrono::Utc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, TryLockError};
use std::thread;
use std::time::Duration;
use sysinfo::{Disks, Networks, System};

/// Default bound on a single filesystem scan.
pub const DEFAULT_DISK_TIMEOUT: Duration = Duration::from_secs(1);

/// One entry per mounted filesystem; an unreadable one is an `Err` entry.
pub type PartitionList = Vec<Result<PartitionReading, SampleError>>;

/// Anything that can list mounted filesystems with their capacity.
pub trait PartitionSource: Send + 'static {
    fn partitions(&mut self) -> Result<PartitionList, SampleError>;
}

impl PartitionSource for Disks {
    fn partitions(&mut self) -> Result<PartitionList, SampleError> {
        // Reloading the list picks up filesystems mounted or unmounted since the last tick.
        self.refresh_list();
        let readings = self
            .list()
            .iter()
            .map(|disk| {
                let mountpoint = disk.mount_point().to_str().ok_or_else(|| SampleError::Unavailable {
                    counter: "disk",
                    reason: format!("non UTF-8 mountpoint {:?}", disk.mount_point()),
                })?;
                Ok(PartitionReading {
                    mountpoint: mountpoint.to_string(),
                    device: disk.name().to_string_lossy().into_owned(),
                    total: disk.total_space(),
                    available: disk.available_space(),
                })
            })
            .collect();
        Ok(readings)
    }
}

fn disk_unavailable(reason: String) -> SampleError {
    SampleError::Unavailable {
        counter: "disk",
        reason,
    }
}

/// Runs a [`PartitionSource`] on a helper thread, bounded by a timeout.
struct BoundedDiskRead {
    source: Arc<Mutex<Box<dyn PartitionSource>>>,
    timeout: Duration,
}

impl BoundedDiskRead {
    fn read(&self) -> Result<PartitionList, SampleError> {
        let source = Arc::clone(&self.source);
        let (tx, rx) = mpsc::sync_channel(1);
        thread::Builder::new()
            .name("disk-scan".to_string())
            .spawn(move || {
                let result = match source.try_lock() {
                    Ok(mut guard) => guard.partitions(),
                    Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().partitions(),
                    Err(TryLockError::WouldBlock) => {
                        Err(disk_unavailable("previous disk scan is still running".to_string()))
                    }
                };
                // The receiver is gone when the caller already gave up.
                let _ = tx.send(result);
            })
            .map_err(|e| disk_unavailable(format!("could not start disk scan: {}", e)))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(disk_unavailable(format!(
                "disk scan did not finish within {:?}",
                self.timeout
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(disk_unavailable("disk scan ended without a result".to_string()))
            }
        }
    }
}

/// Reads host counters through `sysinfo`.
pub struct SysinfoSampler {
    system: System,
    disks: BoundedDiskRead,
    networks: Networks,
}

impl SysinfoSampler {
    /// Creates a new `SysinfoSampler` and primes the CPU counters.
    pub fn new() -> Self {
        // The filesystem list is loaded on the first tick, under the timeout.
        Self::with_partition_source(Box::new(Disks::new()))
    }

    /// Creates a sampler that lists filesystems through `source`.
    pub fn with_partition_source(source: Box<dyn PartitionSource>) -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        Self {
            system,
            disks: BoundedDiskRead {
                source: Arc::new(Mutex::new(source)),
                timeout: DEFAULT_DISK_TIMEOUT,
            },
            networks: Networks::new_with_refreshed_list(),
        }
    }

    pub fn with_disk_timeout(mut self, timeout: Duration) -> Self {
        self.disks.timeout = timeout;
        self
    }

    /// Refreshes every handle and reads each counter independently.
    pub fn read_counters(&mut self) -> CounterReadings {
        CounterReadings {
            cpu: self.read_cpu(),
            memory: self.read_memory(),
            disks: self.disks.read(),
            network: self.read_network(),
        }
    }

    fn read_cpu(&mut self) -> Result<CpuReading, SampleError> {
        self.system.refresh_cpu();
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return Err(SampleError::Unavailable {
                counter: "cpu",
                reason: "no CPUs reported".to_string(),
            });
        }
        Ok(CpuReading {
            overall: self.system.global_cpu_info().cpu_usage() as f64,
            per_core: cpus.iter().map(|cpu| cpu.cpu_usage() as f64).collect(),
        })
    }

    fn read_memory(&mut self) -> Result<f64, SampleError> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return Err(SampleError::Unavailable {
                counter: "memory",
                reason: "total memory reported as zero".to_string(),
            });
        }
        Ok(self.system.used_memory() as f64 / total as f64 * 100.0)
    }

    fn read_network(&mut self) -> Result<NetworkTotals, SampleError> {
        self.networks.refresh_list();
        let mut interfaces = self.networks.iter().peekable();
        if interfaces.peek().is_none() {
            return Err(SampleError::Unavailable {
                counter: "network",
                reason: "no network interfaces reported".to_string(),
            });
        }
        Ok(interfaces.fold(NetworkTotals { sent: 0, recv: 0 }, |acc, (_, data)| NetworkTotals {
            sent: acc.sent.saturating_add(data.total_transmitted()),
            recv: acc.recv.saturating_add(data.total_received()),
        }))
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SysinfoSampler {
    fn collect(&mut self) -> Result<Sample, SampleError> {
        let timestamp = Utc::now();
        self.read_counters().into_sample(timestamp)
    }
}

/// Computes [`SystemInfo`] from a fresh `sysinfo` read on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoHostInfo;

impl HostInfo for SysinfoHostInfo {
    fn system_info(&self) -> SystemInfo {
        let mut system = System::new();
        system.refresh_memory();
        system.refresh_cpu();

        SystemInfo {
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            platform: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            os_version: System::long_os_version(),
            uptime_seconds: System::uptime(),
            cpu_count: system.cpus().len(),
            memory_total: system.total_memory(),
        }
    }
}
