use httpmock::prelude::*;
use sd_worker::adapters::http::{expect_json, RetryPolicy, RetryingClient};
use sd_worker::WorkerError;
use std::time::{Duration, Instant};

fn fast_policy(total: u32) -> RetryPolicy {
    RetryPolicy {
        total,
        backoff_factor: 0.0,
        ..RetryPolicy::default()
    }
}

fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/sdapi/v1/sd-models", port)
}

#[tokio::test]
async fn test_get_retries_forcelist_status_until_exhausted() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/sdapi/v1/sd-models");
            then.status(503).body("loading");
        })
        .await;

    let client = RetryingClient::new(fast_policy(2)).unwrap();
    let err = client
        .get(&server.url("/sdapi/v1/sd-models"), Duration::from_secs(5))
        .await
        .unwrap_err();

    match err {
        WorkerError::RetriesExhausted {
            attempts, reason, ..
        } => {
            assert_eq!(attempts, 3);
            assert!(reason.contains("503"));
        }
        other => panic!("unexpected error: {other}"),
    }
    mock.assert_hits_async(3).await;
}

#[tokio::test]
async fn test_post_is_not_retried_on_status() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/sdapi/v1/txt2img");
            then.status(503).body("busy");
        })
        .await;

    let client = RetryingClient::new(fast_policy(5)).unwrap();
    let response = client
        .post(
            &server.url("/sdapi/v1/txt2img"),
            Some(&serde_json::json!({"prompt": "x"})),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 503);
    mock.assert_hits_async(1).await;

    let err = expect_json(response, "Failed to generate image")
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Failed to generate image: 503 - busy");
}

#[tokio::test]
async fn test_non_forcelist_status_is_returned_immediately() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/sdapi/v1/loras");
            then.status(500);
        })
        .await;

    let client = RetryingClient::new(fast_policy(5)).unwrap();
    let response = client
        .get(&server.url("/sdapi/v1/loras"), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 500);
    mock.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_connection_errors_are_retried_for_every_method() {
    let client = RetryingClient::new(fast_policy(3)).unwrap();
    let err = client
        .post::<()>(&closed_port_url(), None, Duration::from_secs(2))
        .await
        .unwrap_err();

    assert!(
        matches!(err, WorkerError::RetriesExhausted { attempts: 4, .. }),
        "unexpected error: {err}"
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_success_on_first_attempt() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/sdapi/v1/options");
            then.status(200)
                .json_body(serde_json::json!({"sd_model_checkpoint": "dreamshaper_8"}));
        })
        .await;

    let client = RetryingClient::new(RetryPolicy::default()).unwrap();
    let response = client
        .get(&server.url("/sdapi/v1/options"), Duration::from_secs(5))
        .await
        .unwrap();
    let body = expect_json(response, "Failed to fetch options").await.unwrap();

    assert_eq!(body["sd_model_checkpoint"], "dreamshaper_8");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_retry_after_header_sets_the_wait_on_503() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/sdapi/v1/sd-models");
            then.status(503).header("Retry-After", "1").body("loading");
        })
        .await;
    let url = server.url("/sdapi/v1/sd-models");

    let started = Instant::now();
    let err = RetryingClient::new(fast_policy(1))
        .unwrap()
        .get(&url, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkerError::RetriesExhausted { attempts: 2, .. }));
    assert!(started.elapsed() >= Duration::from_secs(1));
    mock.assert_hits_async(2).await;

    let ignoring = RetryPolicy {
        respect_retry_after: false,
        ..fast_policy(1)
    };
    let started = Instant::now();
    RetryingClient::new(ignoring)
        .unwrap()
        .get(&url, Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(1));
    mock.assert_hits_async(4).await;
}
