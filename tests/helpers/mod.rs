#![allow(dead_code)]

pub mod app;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use hostwatch::core::Sample;
use hostwatch::test_utils::sample_at;

/// A sample taken `age` before now, tagged by its CPU reading.
pub fn sample_aged(age: ChronoDuration, cpu_percent: f64) -> Sample {
    sample_at(Utc::now() - age, cpu_percent)
}

/// Truncates to the millisecond precision the store keeps.
pub fn to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ts.timestamp_millis()).unwrap()
}
