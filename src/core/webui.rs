use crate::adapters::http::{expect_json, RetryingClient};
use crate::config::toml_config::HttpConfig;
use crate::utils::error::{Result, WorkerError};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Duration;

/// WebUI `/sdapi/v1` 與 ReActor `/reactor` API 的型別化綁定
#[derive(Debug, Clone)]
pub struct WebUiClient {
    http: RetryingClient,
    api_root: String,
    query_timeout: Duration,
    inference_timeout: Duration,
}

impl WebUiClient {
    pub fn new(api_root: &str, http_config: &HttpConfig) -> Result<Self> {
        Ok(Self::with_http(
            api_root,
            RetryingClient::new(http_config.retry_policy())?,
            http_config,
        ))
    }

    pub fn with_http(api_root: &str, http: RetryingClient, http_config: &HttpConfig) -> Self {
        Self {
            http,
            api_root: api_root.trim_end_matches('/').to_string(),
            query_timeout: http_config.query_timeout(),
            inference_timeout: http_config.inference_timeout(),
        }
    }

    fn sdapi(&self, path: &str) -> String {
        format!("{}/sdapi/v1/{}", self.api_root, path)
    }

    fn reactor(&self, path: &str) -> String {
        format!("{}/reactor/{}", self.api_root, path)
    }

    async fn get_json(&self, url: &str, context: &str) -> Result<Value> {
        let response = self.http.get(url, self.query_timeout).await?;
        expect_json(response, context).await
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
        timeout: Duration,
        context: &str,
    ) -> Result<Value> {
        let response = self.http.post(url, Some(body), timeout).await?;
        expect_json(response, context).await
    }

    /// 失敗只記錄警告，回傳是否成功
    pub async fn refresh_checkpoints(&self) -> Result<bool> {
        let response = self
            .http
            .post::<()>(&self.sdapi("refresh-checkpoints"), None, self.query_timeout)
            .await?;

        if response.status() != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("⚠️ Failed to refresh checkpoints: {}", body);
            return Ok(false);
        }
        tracing::info!("🔄 Checkpoints refreshed successfully");
        Ok(true)
    }

    pub async fn available_models(&self) -> Result<Vec<String>> {
        let models = self
            .get_json(&self.sdapi("sd-models"), "Failed to fetch models")
            .await?;

        let names: Vec<String> = as_array(&models)
            .iter()
            .filter_map(|model| {
                let name = model
                    .get("model_name")
                    .or_else(|| model.get("title"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let name = name.strip_suffix(".safetensors").unwrap_or(name);
                (!name.is_empty()).then(|| name.to_string())
            })
            .collect();

        tracing::debug!("Available models: {:?}", names);
        Ok(names)
    }

    pub async fn available_loras(&self) -> Result<Vec<String>> {
        let loras = self
            .get_json(&self.sdapi("loras"), "Failed to fetch LoRAs")
            .await?;

        let names: Vec<String> = as_array(&loras)
            .iter()
            .filter_map(|lora| lora.get("name").and_then(Value::as_str))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect();

        tracing::debug!("Available LoRAs: {:?}", names);
        Ok(names)
    }

    pub async fn available_embeddings(&self) -> Result<Vec<String>> {
        let embeddings = self
            .get_json(&self.sdapi("embeddings"), "Failed to fetch embeddings")
            .await?;

        let names: Vec<String> = embeddings
            .get("loaded")
            .and_then(Value::as_object)
            .map(|loaded| loaded.keys().cloned().collect())
            .unwrap_or_default();

        tracing::debug!("Available embeddings: {:?}", names);
        Ok(names)
    }

    pub async fn controlnet_models(&self) -> Result<Vec<String>> {
        let body = self
            .get_json(
                &self.sdapi("controlnet/model_list"),
                "Failed to fetch ControlNet models",
            )
            .await?;
        Ok(string_list(&body, "model_list"))
    }

    pub async fn controlnet_modules(&self) -> Result<Vec<String>> {
        let body = self
            .get_json(
                &self.sdapi("controlnet/module_list"),
                "Failed to fetch ControlNet modules",
            )
            .await?;
        Ok(string_list(&body, "module_list"))
    }

    pub async fn txt2img<P: Serialize + ?Sized>(&self, payload: &P) -> Result<Value> {
        let result = self
            .post_json(
                &self.sdapi("txt2img"),
                payload,
                self.inference_timeout,
                "Failed to generate image",
            )
            .await?;
        tracing::info!("🎨 Image generation successful");
        Ok(result)
    }

    pub async fn img2img<P: Serialize + ?Sized>(&self, payload: &P) -> Result<Value> {
        let result = self
            .post_json(
                &self.sdapi("img2img"),
                payload,
                self.inference_timeout,
                "Failed to generate image from image",
            )
            .await?;
        tracing::info!("🎨 img2img generation successful");
        Ok(result)
    }

    pub async fn options(&self) -> Result<Value> {
        self.get_json(&self.sdapi("options"), "Failed to fetch options")
            .await
    }

    pub async fn set_options(&self, options: &Map<String, Value>) -> Result<Value> {
        self.post_json(
            &self.sdapi("options"),
            options,
            self.query_timeout,
            "Failed to update options",
        )
        .await
    }

    pub async fn extensions(&self) -> Result<Value> {
        self.get_json(&self.sdapi("extensions"), "Failed to fetch extensions")
            .await
    }

    /// 需要 WebUI 以 `--api-server-stop` 啟動
    pub async fn restart(&self) -> Result<()> {
        let response = self
            .http
            .post::<()>(&self.sdapi("server-restart"), None, self.query_timeout)
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::Upstream {
                context: "Failed to restart WebUI".to_string(),
                status: status.as_u16(),
                body,
            });
        }
        tracing::info!("♻️ WebUI restart requested");
        Ok(())
    }

    pub async fn reactor_swap<P: Serialize + ?Sized>(&self, payload: &P) -> Result<Value> {
        self.post_json(
            &self.reactor("image"),
            payload,
            self.inference_timeout,
            "Failed to swap face",
        )
        .await
    }

    pub async fn reactor_models(&self) -> Result<Vec<String>> {
        let body = self
            .get_json(&self.reactor("models"), "Failed to fetch ReActor models")
            .await?;
        Ok(string_list(&body, "models"))
    }
}

fn as_array(value: &Value) -> &[Value] {
    value.as_array().map(Vec::as_slice).unwrap_or_default()
}

fn string_list(body: &Value, key: &str) -> Vec<String> {
    body.get(key)
        .map(as_array)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}
