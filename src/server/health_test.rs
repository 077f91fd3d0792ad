#![allow(clippy::unwrap_used, clippy::expect_used)] // Tests can use unwrap for brevity

use super::*;
use std::time::Duration;

fn no_shutdown() -> ShutdownSignal {
    let (controller, signal) = shutdown_channel();
    std::mem::forget(controller);
    signal
}

/// Poll `/healthz` until the server accepts connections
async fn wait_for_server(port: u16, max_retries: u32) -> reqwest::Client {
    let client = reqwest::Client::new();
    let mut delay = Duration::from_millis(10);

    for attempt in 1..=max_retries {
        match client
            .get(format!("http://127.0.0.1:{}/healthz", port))
            .timeout(Duration::from_millis(100))
            .send()
            .await
        {
            Ok(_) => return client,
            Err(_) if attempt < max_retries => {
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_millis(200));
            }
            Err(e) => panic!("Server not ready after {} attempts: {}", max_retries, e),
        }
    }
    client
}

fn spawn_server(
    port: u16,
    readiness: ReadinessState,
    metrics: SharedMetrics,
) -> tokio::task::JoinHandle<Result<(), std::io::Error>> {
    tokio::spawn(async move { run_health_server(port, readiness, metrics, no_shutdown()).await })
}

async fn get(client: &reqwest::Client, port: u16, path: &str) -> reqwest::Response {
    client
        .get(format!("http://127.0.0.1:{}{}", port, path))
        .timeout(Duration::from_secs(5))
        .send()
        .await
        .expect("Failed to connect to health server")
}

#[tokio::test]
async fn test_healthz_returns_200() {
    let port = 18180;
    let handle = spawn_server(port, ReadinessState::new(), create_metrics().unwrap());
    let client = wait_for_server(port, 10).await;

    assert_eq!(get(&client, port, "/healthz").await.status(), 200);

    handle.abort();
}

#[tokio::test]
async fn test_readyz_follows_readiness_state() {
    let readiness = ReadinessState::new();
    let port = 18181;
    let handle = spawn_server(port, readiness.clone(), create_metrics().unwrap());
    let client = wait_for_server(port, 10).await;

    assert_eq!(get(&client, port, "/readyz").await.status(), 503);

    readiness.set_ready();
    assert_eq!(get(&client, port, "/readyz").await.status(), 200);

    readiness.set_not_ready();
    assert_eq!(get(&client, port, "/readyz").await.status(), 503);

    handle.abort();
}

#[tokio::test]
async fn test_metrics_endpoint_serves_registry() {
    let metrics = create_metrics().unwrap();
    metrics.record_reconciliation_success("Serverless", 0.05);

    let port = 18182;
    let handle = spawn_server(port, ReadinessState::new(), metrics);
    let client = wait_for_server(port, 10).await;

    let response = get(&client, port, "/metrics").await;
    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("isvc_ingress_reconciliations_total"));

    handle.abort();
}

#[tokio::test]
async fn test_server_stops_on_shutdown() {
    let (controller, signal) = shutdown_channel();
    let port = 18183;
    let handle = tokio::spawn(async move {
        run_health_server(port, ReadinessState::new(), create_metrics().unwrap(), signal).await
    });
    wait_for_server(port, 10).await;

    controller.shutdown();
    let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
    assert!(result.unwrap().unwrap().is_ok());
}

#[test]
fn test_readiness_state_is_shared_between_clones() {
    let state = ReadinessState::new();
    assert!(!state.is_ready());

    let cloned = state.clone();
    state.set_ready();
    assert!(cloned.is_ready());
}
