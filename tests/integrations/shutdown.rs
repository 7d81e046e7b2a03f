//! Full application lifecycle: start, collect, serve, shut down.

#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::app::TestAppBuilder;
use hostwatch::core::{MetricsStore, Sample};
use std::time::Duration;

#[tokio::test]
async fn test_app_collects_serves_and_shuts_down() {
    let app = TestAppBuilder::new()
        .with_live_collector(1)
        .with_metrics_server()
        .start()
        .await
        .unwrap();

    // The first tick fires immediately.
    app.wait_for_samples(1, Duration::from_secs(5)).await.unwrap();
    let latest: Option<Sample> = app.get("/api/metrics/latest").await.json().await.unwrap();
    assert!(latest.and_then(|s| s.cpu_percent).is_some());

    let metrics_url = format!("http://{}/metrics", app.metrics_addr());
    let mut metrics_body = String::new();
    for _ in 0..50 {
        metrics_body = reqwest::get(&metrics_url).await.unwrap().text().await.unwrap();
        if metrics_body.contains("collector_ticks_total{outcome=\"persisted\"}") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(
        metrics_body.contains("collector_ticks_total{outcome=\"persisted\"}"),
        "metrics output was: {}",
        metrics_body
    );

    let api_addr = app.api_addr();
    let store = app.store.clone();
    app.shutdown(Duration::from_secs(5)).await.unwrap();

    // The API no longer accepts connections and the collector stopped writing.
    assert!(tokio::net::TcpStream::connect(api_addr).await.is_err());
    let persisted = store.count().await.unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(store.count().await.unwrap(), persisted);
    assert!(store.latest().await.unwrap().is_some());
}

#[tokio::test]
async fn test_shutdown_before_any_request_is_clean() {
    let app = TestAppBuilder::new().start().await.unwrap();
    app.shutdown(Duration::from_secs(5)).await.unwrap();
}
