//! Threshold evaluation over the recent sample history.
//!
//! CPU and memory are averaged over a trailing window; disk usage is checked
//! per monitored mountpoint on the most recent sample. Breaches are logged
//! and reported through the API. Nothing is delivered anywhere else.

use crate::config::AlertsConfig;
use crate::core::{MetricsStore, Sample};
use crate::internal_metrics::Metrics;
use crate::store::StorageError;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertMetric {
    Cpu,
    Memory,
    Disk,
}

impl AlertMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Disk => "disk",
        }
    }
}

/// A metric at or above its configured threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdAlert {
    pub metric: AlertMetric,
    pub value: f64,
    pub threshold: f64,
    pub details: String,
}

/// The result of evaluating one window.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Evaluation {
    pub alerts: Vec<ThresholdAlert>,
    pub samples: usize,
    pub window_minutes: u64,
}

fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Checks `samples` (oldest first) against the thresholds in `config`.
pub fn evaluate(samples: &[Sample], config: &AlertsConfig) -> Vec<ThresholdAlert> {
    let mut alerts = Vec::new();

    let averaged: [(AlertMetric, f64, &str, fn(&Sample) -> Option<f64>); 2] = [
        (AlertMetric::Cpu, config.cpu_threshold, "CPU usage", |s| s.cpu_percent),
        (AlertMetric::Memory, config.memory_threshold, "memory usage", |s| s.memory_percent),
    ];
    for (metric, threshold, label, read) in averaged {
        let values: Vec<f64> = samples.iter().filter_map(read).collect();
        let Some(avg) = average(values.iter().copied()) else {
            continue;
        };
        if avg >= threshold {
            alerts.push(ThresholdAlert {
                metric,
                value: avg,
                threshold,
                details: format!("Average {}: {:.1}% over {} samples", label, avg, values.len()),
            });
        }
    }

    if let Some(latest) = samples.last() {
        let monitored: Vec<_> = latest
            .disk_details
            .iter()
            .filter(|d| config.monitored_mountpoints.iter().any(|m| m == &d.mountpoint))
            .collect();
        let breaching: Vec<String> = monitored
            .iter()
            .filter(|d| d.percent >= config.disk_threshold)
            .map(|d| format!("{}: {:.1}%", d.mountpoint, d.percent))
            .collect();
        if !breaching.is_empty() {
            let worst = monitored.iter().map(|d| d.percent).fold(f64::MIN, f64::max);
            alerts.push(ThresholdAlert {
                metric: AlertMetric::Disk,
                value: worst,
                threshold: config.disk_threshold,
                details: format!("Mountpoints exceeding threshold:\n{}", breaching.join("\n")),
            });
        }
    }

    alerts
}

/// Periodically evaluates thresholds against the store.
pub struct ThresholdEvaluator {
    store: Arc<dyn MetricsStore>,
    config: AlertsConfig,
    metrics: Arc<Metrics>,
}

impl ThresholdEvaluator {
    pub fn new(store: Arc<dyn MetricsStore>, config: AlertsConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            store,
            config,
            metrics,
        }
    }

    /// Evaluates the trailing window ending now.
    pub async fn evaluate_now(&self) -> Result<Evaluation, StorageError> {
        let window = ChronoDuration::minutes(self.config.window_minutes as i64);
        let samples = self.store.query_range(Utc::now() - window).await?;
        Ok(Evaluation {
            alerts: evaluate(&samples, &self.config),
            samples: samples.len(),
            window_minutes: self.config.window_minutes,
        })
    }

    /// Evaluates on the configured interval until the shutdown signal, logging
    /// each breach.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        info!("Threshold evaluator started.");
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.check_interval_seconds));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Threshold evaluator received shutdown signal.");
                    break;
                }
                _ = interval.tick() => {
                    match self.evaluate_now().await {
                        Ok(evaluation) if evaluation.samples == 0 => {
                            debug!(window_minutes = evaluation.window_minutes, "No samples in window, nothing to evaluate");
                        }
                        Ok(evaluation) => {
                            for alert in &evaluation.alerts {
                                self.metrics.increment_threshold_alert(alert.metric.as_str());
                                warn!(
                                    metric = alert.metric.as_str(),
                                    value = alert.value,
                                    threshold = alert.threshold,
                                    "{}", alert.details
                                );
                            }
                        }
                        Err(e) => error!(error = %e, "Threshold evaluation failed"),
                    }
                }
            }
        }
        info!("Threshold evaluator finished.");
    }
}
