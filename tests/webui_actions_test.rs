mod common;

use common::{mock_components, test_handler};
use httpmock::prelude::*;
use sd_worker::WorkerError;
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn test_img2img_sends_init_images_and_returns_images() {
    let server = MockServer::start_async().await;
    let root = TempDir::new().unwrap();
    let _components = mock_components(&server).await;

    let img2img = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/sdapi/v1/img2img")
                .body_contains(r#""init_images":["aW5pdA=="]"#)
                .body_contains(r#""denoising_strength":0.75"#)
                .body_contains(r#""prompt":"a castle <lora:add_detail:1> easynegative""#);
            then.status(200)
                .json_body(json!({"images": ["b3V0"], "parameters": {}, "info": "{}"}));
        })
        .await;

    let handler = test_handler(&server, root.path());
    let output = handler
        .handle(&json!({
            "action": "img2img",
            "prompt": "a castle",
            "init_images": ["aW5pdA=="],
            "loras": [{"name": "add_detail", "weight": 1}],
            "embeddings": ["easynegative"]
        }))
        .await
        .unwrap();

    assert_eq!(output, json!({"images": ["b3V0"]}));
    img2img.assert_async().await;
}

#[tokio::test]
async fn test_img2img_without_init_images_is_invalid_input() {
    let server = MockServer::start_async().await;
    let root = TempDir::new().unwrap();
    let img2img = server
        .mock_async(|when, then| {
            when.method(POST).path("/sdapi/v1/img2img");
            then.status(200).json_body(json!({"images": []}));
        })
        .await;

    let handler = test_handler(&server, root.path());
    let err = handler
        .handle(&json!({"action": "img2img", "prompt": "x"}))
        .await
        .unwrap_err();

    assert!(matches!(err, WorkerError::InvalidInput { .. }));
    assert_eq!(err.to_string(), "init_images is required for img2img action");
    img2img.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_generation_response_without_images_is_upstream_error() {
    let server = MockServer::start_async().await;
    let root = TempDir::new().unwrap();
    let _components = mock_components(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/sdapi/v1/txt2img");
            then.status(200).json_body(json!({"parameters": {}}));
        })
        .await;

    let handler = test_handler(&server, root.path());
    let err = handler
        .handle(&json!({"prompt": "a castle"}))
        .await
        .unwrap_err();

    match err {
        WorkerError::Upstream {
            context, status, ..
        } => {
            assert_eq!(context, "txt2img response had no 'images' field");
            assert_eq!(status, 200);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_set_options_requires_options_object() {
    let server = MockServer::start_async().await;
    let root = TempDir::new().unwrap();
    let options = server
        .mock_async(|when, then| {
            when.method(POST).path("/sdapi/v1/options");
            then.status(200).json_body(json!(null));
        })
        .await;

    let handler = test_handler(&server, root.path());
    let err = handler
        .handle(&json!({"action": "set_options"}))
        .await
        .unwrap_err();

    assert!(matches!(err, WorkerError::InvalidInput { .. }));
    assert!(err
        .to_string()
        .contains("options object is required for set_options action"));
    options.assert_hits_async(0).await;
}

#[tokio::test]
async fn test_set_options_forwards_options_as_is() {
    let server = MockServer::start_async().await;
    let root = TempDir::new().unwrap();
    let options = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/sdapi/v1/options")
                .json_body(json!({"sd_model_checkpoint": "dreamshaper_8", "CLIP_stop_at_last_layers": 2}));
            then.status(200).json_body(json!(null));
        })
        .await;

    let handler = test_handler(&server, root.path());
    let output = handler
        .handle(&json!({
            "action": "set_options",
            "options": {"sd_model_checkpoint": "dreamshaper_8", "CLIP_stop_at_last_layers": 2}
        }))
        .await
        .unwrap();

    assert_eq!(output, json!(null));
    options.assert_async().await;
}

#[tokio::test]
async fn test_get_options_and_list_extensions_pass_through() {
    let server = MockServer::start_async().await;
    let root = TempDir::new().unwrap();
    server
        .mock_async(|when, then| {
            when.method(GET).path("/sdapi/v1/options");
            then.status(200)
                .json_body(json!({"sd_model_checkpoint": "dreamshaper_8", "samples_format": "png"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/sdapi/v1/extensions");
            then.status(200).json_body(json!([
                {"name": "sd-webui-controlnet", "enabled": true, "version": "56cec5b2"}
            ]));
        })
        .await;

    let handler = test_handler(&server, root.path());
    let options = handler.handle(&json!({"action": "get_options"})).await.unwrap();
    assert_eq!(
        options,
        json!({"sd_model_checkpoint": "dreamshaper_8", "samples_format": "png"})
    );

    let extensions = handler
        .handle(&json!({"action": "list_extensions"}))
        .await
        .unwrap();
    assert_eq!(extensions[0]["name"], "sd-webui-controlnet");
    assert_eq!(extensions.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reactor_models_lists_names() {
    let server = MockServer::start_async().await;
    let root = TempDir::new().unwrap();
    let models = server
        .mock_async(|when, then| {
            when.method(GET).path("/reactor/models");
            then.status(200)
                .json_body(json!({"models": ["inswapper_128.onnx", "reswapper_256.onnx"]}));
        })
        .await;

    let handler = test_handler(&server, root.path());
    let output = handler
        .handle(&json!({"action": "reactor_models"}))
        .await
        .unwrap();

    assert_eq!(
        output,
        json!({"models": ["inswapper_128.onnx", "reswapper_256.onnx"]})
    );
    models.assert_async().await;
}

#[tokio::test]
async fn test_restart_reports_request_message() {
    let server = MockServer::start_async().await;
    let root = TempDir::new().unwrap();
    let restart = server
        .mock_async(|when, then| {
            when.method(POST).path("/sdapi/v1/server-restart");
            then.status(200);
        })
        .await;

    let handler = test_handler(&server, root.path());
    let output = handler.handle(&json!({"action": "restart"})).await.unwrap();

    assert_eq!(output, json!({"message": "WebUI restart requested"}));
    restart.assert_async().await;
}

#[tokio::test]
async fn test_refresh_checkpoints_reports_failure_without_error() {
    let server = MockServer::start_async().await;
    let root = TempDir::new().unwrap();
    let refresh = server
        .mock_async(|when, then| {
            when.method(POST).path("/sdapi/v1/refresh-checkpoints");
            then.status(500).body("model folder missing");
        })
        .await;

    let handler = test_handler(&server, root.path());
    let output = handler
        .handle(&json!({"action": "refresh_checkpoints"}))
        .await
        .unwrap();

    assert_eq!(output, json!({"refreshed": false}));
    refresh.assert_async().await;
}
