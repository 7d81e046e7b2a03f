use super::{ApiError, AppState};
use crate::alerts::Evaluation;
use crate::core::{ProbeResult, Sample, SystemInfo};
use crate::store::RETENTION_HORIZON;
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, error, instrument};

/// Largest `hours` value served; anything above is clamped to the retention window.
pub const MAX_HISTORY_HOURS: i64 = (RETENTION_HORIZON.as_secs() / 3600) as i64;

const DEFAULT_HISTORY_HOURS: i64 = 1;

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    hours: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProbeParams {
    url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub metrics: Vec<Sample>,
}

/// Parses the `hours` parameter: absent means 1, otherwise a whole number of
/// at least 1, clamped to the retention window.
pub fn parse_hours(raw: Option<&str>) -> Result<i64, ApiError> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_HISTORY_HOURS);
    };
    let hours: i64 = raw.trim().parse().map_err(|_| ApiError::InvalidQueryParameter {
        name: "hours",
        reason: format!("expected a whole number, got {:?}", raw),
    })?;
    if hours < 1 {
        return Err(ApiError::InvalidQueryParameter {
            name: "hours",
            reason: format!("must be at least 1, got {}", hours),
        });
    }
    Ok(hours.min(MAX_HISTORY_HOURS))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn system_info(State(state): State<AppState>) -> Json<SystemInfo> {
    Json(state.host.system_info())
}

#[instrument(skip_all)]
pub async fn latest(State(state): State<AppState>) -> Json<Option<Sample>> {
    let start = Instant::now();
    let result = state.store.latest().await;
    state.metrics.record_store_query(start.elapsed());
    match result {
        Ok(sample) => Json(sample),
        Err(e) => {
            error!(error = %e, "Failed to read latest sample");
            Json(None)
        }
    }
}

#[instrument(skip_all)]
pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let hours = parse_hours(params.hours.as_deref())?;
    let since = Utc::now() - ChronoDuration::hours(hours);

    let start = Instant::now();
    let result = state.store.query_range(since).await;
    state.metrics.record_store_query(start.elapsed());
    let metrics = match result {
        Ok(samples) => samples,
        Err(e) => {
            error!(error = %e, hours, "Failed to read sample history");
            Vec::new()
        }
    };
    debug!(hours, returned = metrics.len(), "History served");
    Ok(Json(HistoryResponse { metrics }))
}

pub async fn alerts(State(state): State<AppState>) -> Json<Evaluation> {
    match state.evaluator.evaluate_now().await {
        Ok(evaluation) => Json(evaluation),
        Err(e) => {
            error!(error = %e, "Failed to evaluate thresholds");
            Json(Evaluation {
                alerts: Vec::new(),
                samples: 0,
                window_minutes: state.config.alerts.window_minutes,
            })
        }
    }
}

pub async fn probe(
    State(state): State<AppState>,
    Query(params): Query<ProbeParams>,
) -> Result<Json<ProbeResult>, ApiError> {
    let url = params
        .url
        .filter(|url| !url.trim().is_empty())
        .or_else(|| state.config.probe.target_url.clone())
        .ok_or(ApiError::MissingProbeTarget)?;
    Ok(Json(state.probe.check(&url).await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hours_defaults_to_one() {
        assert_eq!(parse_hours(None), Ok(1));
    }

    #[test]
    fn test_parse_hours_clamps_to_retention() {
        assert_eq!(MAX_HISTORY_HOURS, 168);
        assert_eq!(parse_hours(Some("24")), Ok(24));
        assert_eq!(parse_hours(Some("200")), Ok(168));
    }

    #[test]
    fn test_parse_hours_rejects_malformed_and_non_positive() {
        for raw in ["0", "-3", "abc", "1.5", ""] {
            assert!(
                matches!(parse_hours(Some(raw)), Err(ApiError::InvalidQueryParameter { name: "hours", .. })),
                "{:?} should be rejected",
                raw
            );
        }
    }
}
