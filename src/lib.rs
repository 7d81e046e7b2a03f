//! HostWatch - a single-host resource monitor.
//!
//! The collector samples CPU, memory, disk and network counters on a fixed
//! cadence and appends them to a SQLite history with 7-day retention. A small
//! HTTP API serves the latest sample, historical ranges, static host facts,
//! threshold evaluations and an on-demand probe of an external service.

pub mod alerts;
pub mod api;
pub mod app;
pub mod cli;
pub mod collector;
pub mod config;
pub mod core;
pub mod internal_metrics;
pub mod probe;
pub mod sampler;
pub mod store;
pub mod task_manager;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export core types for convenience
pub use crate::core::*;
