#![allow(dead_code)]

use httpmock::prelude::*;
use httpmock::Mock;
use sd_worker::config::toml_config::PathsConfig;
use sd_worker::{JobHandler, LocalModelStorage, WorkerConfig};
use std::path::Path;

/// 指向 mock WebUI 與暫存目錄的設定，重試不等待
pub fn test_config(api_root: &str, webui_root: &Path) -> WorkerConfig {
    let mut config = WorkerConfig::default();
    config.webui.api_root = api_root.to_string();
    config.paths = PathsConfig::rooted_at(webui_root);
    config.http.retry_total = 2;
    config.http.backoff_factor = 0.0;
    config.http.query_timeout_secs = 5;
    config.http.inference_timeout_secs = 5;
    config.http.download_timeout_secs = 5;
    config.provision.models_list = webui_root.join("models.txt").display().to_string();
    config.provision.extensions_list = webui_root.join("extensions.txt").display().to_string();
    config
}

pub fn test_handler(server: &MockServer, webui_root: &Path) -> JobHandler<LocalModelStorage> {
    let config = test_config(&server.base_url(), webui_root);
    JobHandler::new(&config, LocalModelStorage::new(&config.paths)).unwrap()
}

/// 模擬 WebUI 回報的可用元件
pub async fn mock_components(server: &MockServer) -> Vec<Mock<'_>> {
    vec![
        server
            .mock_async(|when, then| {
                when.method(GET).path("/sdapi/v1/sd-models");
                then.status(200).json_body(serde_json::json!([
                    {"title": "dreamshaper_8.safetensors [879db523c3]", "model_name": "dreamshaper_8"},
                    {"title": "realisticVision.safetensors"}
                ]));
            })
            .await,
        server
            .mock_async(|when, then| {
                when.method(GET).path("/sdapi/v1/loras");
                then.status(200).json_body(serde_json::json!([
                    {"name": "add_detail", "path": "/m/Lora/add_detail.safetensors"},
                    {"path": "/m/Lora/unnamed.safetensors"}
                ]));
            })
            .await,
        server
            .mock_async(|when, then| {
                when.method(GET).path("/sdapi/v1/embeddings");
                then.status(200).json_body(serde_json::json!({
                    "loaded": {"easynegative": {"step": 1}},
                    "skipped": {}
                }));
            })
            .await,
        server
            .mock_async(|when, then| {
                when.method(GET).path("/sdapi/v1/controlnet/model_list");
                then.status(200).json_body(serde_json::json!({
                    "model_list": ["control_v11p_sd15_canny [d14c016b]"]
                }));
            })
            .await,
        server
            .mock_async(|when, then| {
                when.method(GET).path("/sdapi/v1/controlnet/module_list");
                then.status(200).json_body(serde_json::json!({
                    "module_list": ["none", "canny"]
                }));
            })
            .await,
    ]
}

pub fn write_model(dir: &Path, name: &str, bytes: &[u8]) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join(name), bytes).unwrap();
}
