//! HTTP-level tests of the query API against a running app.

mod helpers;

use chrono::Duration as ChronoDuration;
use helpers::{app::TestAppBuilder, sample_aged};
use hostwatch::api::handlers::HistoryResponse;
use hostwatch::core::{MetricsStore, ProbeResult, ProbeStatus, Sample, SystemInfo};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

fn cpu_values(samples: &[Sample]) -> Vec<Option<f64>> {
    samples.iter().map(|s| s.cpu_percent).collect()
}

#[tokio::test]
async fn test_health_reports_ok() {
    let app = TestAppBuilder::new().start().await.unwrap();

    let response = app.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "status": "ok" }));

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_latest_is_null_before_first_sample() {
    let app = TestAppBuilder::new().start().await.unwrap();

    let response = app.get("/api/metrics/latest").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "null");

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_latest_returns_newest_sample() {
    let app = TestAppBuilder::new().start().await.unwrap();
    app.store.append(&sample_aged(ChronoDuration::minutes(10), 10.0)).await.unwrap();
    app.store.append(&sample_aged(ChronoDuration::minutes(1), 20.0)).await.unwrap();

    let latest: Option<Sample> = app.get("/api/metrics/latest").await.json().await.unwrap();
    let latest = latest.expect("a sample should be returned");
    assert_eq!(latest.cpu_percent, Some(20.0));
    assert_eq!(latest.disk_details.len(), 1);
    assert_eq!(latest.disk_details[0].mountpoint, "/");

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_history_defaults_to_last_hour_in_ascending_order() {
    let app = TestAppBuilder::new().start().await.unwrap();
    for (age_minutes, cpu) in [(180, 1.0), (90, 2.0), (30, 3.0), (5, 4.0)] {
        app.store
            .append(&sample_aged(ChronoDuration::minutes(age_minutes), cpu))
            .await
            .unwrap();
    }

    let history: HistoryResponse = app.get("/api/history").await.json().await.unwrap();
    assert_eq!(cpu_values(&history.metrics), vec![Some(3.0), Some(4.0)]);

    let history: HistoryResponse = app.get("/api/history?hours=2").await.json().await.unwrap();
    assert_eq!(cpu_values(&history.metrics), vec![Some(2.0), Some(3.0), Some(4.0)]);

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_history_clamps_large_windows_to_retention() {
    let app = TestAppBuilder::new().start().await.unwrap();
    // Not purged: the idle collector never completes a tick.
    app.store.append(&sample_aged(ChronoDuration::days(8), 1.0)).await.unwrap();
    app.store
        .append(&sample_aged(ChronoDuration::days(7) - ChronoDuration::hours(1), 2.0))
        .await
        .unwrap();

    let response = app.get("/api/history?hours=200").await;
    assert_eq!(response.status(), StatusCode::OK);
    let history: HistoryResponse = response.json().await.unwrap();
    assert_eq!(cpu_values(&history.metrics), vec![Some(2.0)]);

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_history_rejects_invalid_hours() {
    let app = TestAppBuilder::new().start().await.unwrap();

    for query in ["hours=0", "hours=-1", "hours=abc", "hours=2.5"] {
        let response = app.get(&format!("/api/history?{}", query)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "query {}", query);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "invalid_query_parameter");
        assert!(body["message"].as_str().unwrap().contains("hours"));
    }

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_system_info_comes_from_host() {
    let app = TestAppBuilder::new().start().await.unwrap();

    let info: SystemInfo = app.get("/api/system").await.json().await.unwrap();
    assert_eq!(info.hostname, "test-host");
    assert_eq!(info.platform, "Linux");
    assert_eq!(info.cpu_count, 4);
    assert_eq!(info.uptime_seconds, 3600);

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_probe_uses_query_url() {
    let app = TestAppBuilder::new()
        .with_probe_status(ProbeStatus::Offline)
        .start()
        .await
        .unwrap();

    let result: ProbeResult = app
        .get("/api/odoo/health?url=http://odoo.internal:8069")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(result.status, ProbeStatus::Offline);
    assert_eq!(result.url, "http://odoo.internal:8069");
    assert_eq!(
        *app.probe.checked.lock().unwrap(),
        vec!["http://odoo.internal:8069".to_string()]
    );

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_probe_falls_back_to_configured_target() {
    let app = TestAppBuilder::new()
        .with_config_modifier(|config| {
            config.probe.target_url = Some("https://erp.example.com".to_string());
        })
        .start()
        .await
        .unwrap();

    let result: ProbeResult = app.get("/api/odoo/health").await.json().await.unwrap();
    assert_eq!(result.status, ProbeStatus::Online);
    assert_eq!(result.url, "https://erp.example.com");

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_probe_without_any_target_is_rejected() {
    let app = TestAppBuilder::new().start().await.unwrap();

    let response = app.get("/api/odoo/health").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "missing_probe_target");
    assert!(app.probe.checked.lock().unwrap().is_empty());

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_alerts_report_sustained_cpu() {
    let app = TestAppBuilder::new().start().await.unwrap();
    for age_minutes in [12, 8, 3] {
        app.store
            .append(&sample_aged(ChronoDuration::minutes(age_minutes), 99.0))
            .await
            .unwrap();
    }
    // Outside the 15 minute window.
    app.store.append(&sample_aged(ChronoDuration::minutes(40), 0.0)).await.unwrap();

    let body: Value = app.get("/api/alerts").await.json().await.unwrap();
    assert_eq!(body["samples"], 3);
    assert_eq!(body["window_minutes"], 15);
    let alerts = body["alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["metric"], "cpu");
    assert_eq!(alerts[0]["value"], 99.0);

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_store_read_failures_are_served_as_empty_results() {
    let app = TestAppBuilder::new().with_failing_store().start().await.unwrap();

    let response = app.get("/api/metrics/latest").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "null");

    let response = app.get("/api/history?hours=3").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "metrics": [] }));

    let response = app.get("/api/alerts").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({ "alerts": [], "samples": 0, "window_minutes": 15 })
    );

    // Parameter validation still applies.
    let response = app.get("/api/history?hours=0").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let app = TestAppBuilder::new().start().await.unwrap();

    let response = app
        .client
        .get(app.url("/health"))
        .header("Origin", "http://dashboard.example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers().get("access-control-allow-origin").unwrap(),
        "http://dashboard.example.com"
    );

    app.shutdown(Duration::from_secs(5)).await.unwrap();
}
