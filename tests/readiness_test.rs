mod common;

use common::test_config;
use httpmock::prelude::*;
use sd_worker::config::toml_config::ReadinessConfig;
use sd_worker::core::readiness::ReadinessProbe;
use sd_worker::WorkerError;
use std::time::Duration;
use tempfile::TempDir;

fn fast_probe() -> ReadinessProbe {
    ReadinessProbe::new(&ReadinessConfig {
        poll_interval_ms: 10,
        request_timeout_secs: 1,
        ..ReadinessConfig::default()
    })
}

#[tokio::test]
async fn test_any_http_response_counts_as_ready() {
    let server = MockServer::start_async().await;
    let root = TempDir::new().unwrap();
    let models = server
        .mock_async(|when, then| {
            when.method(GET).path("/sdapi/v1/sd-models");
            then.status(500).body("still loading");
        })
        .await;

    let config = test_config(&server.base_url(), root.path());
    let failures = fast_probe()
        .wait_for_service(&config.readiness_url())
        .await
        .unwrap();

    assert_eq!(failures, 0);
    models.assert_async().await;
}

#[tokio::test]
async fn test_gives_up_after_max_wait() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = fast_probe()
        .with_max_wait(Some(Duration::from_millis(100)))
        .wait_for_service(&format!("http://127.0.0.1:{}/sdapi/v1/sd-models", port))
        .await
        .unwrap_err();

    assert!(matches!(err, WorkerError::ServiceUnavailable { .. }));
}
