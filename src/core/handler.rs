use crate::config::toml_config::WorkerConfig;
use crate::core::download::Downloader;
use crate::core::models::ModelManager;
use crate::core::payload::{Img2ImgPayload, Txt2ImgPayload};
use crate::core::provision::Provisioner;
use crate::core::webui::WebUiClient;
use crate::domain::input::{
    parse_input, DeleteModelInput, DownloadModelInput, FaceSwapInput, GenerateInput,
    Img2ImgInput, InstallInput, ListModelsInput, RenameModelInput, SetOptionsInput,
};
use crate::domain::model::Action;
use crate::domain::ports::{JobExecutor, ModelStorage};
use crate::utils::error::{Result, WorkerError};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// 依 `action` 將 job 分派到對應的 WebUI 呼叫或檔案操作
pub struct JobHandler<S: ModelStorage> {
    webui: WebUiClient,
    models: ModelManager<S>,
    provisioner: Provisioner<S>,
    models_list: String,
    extensions_list: String,
}

impl<S: ModelStorage> JobHandler<S> {
    pub fn new(config: &WorkerConfig, storage: S) -> Result<Self> {
        let webui = WebUiClient::new(&config.webui.api_root, &config.http)?;
        let downloader = Downloader::new(config.http.download_timeout())?;
        Ok(Self::with_parts(config, webui, downloader, Arc::new(storage)))
    }

    pub fn with_parts(
        config: &WorkerConfig,
        webui: WebUiClient,
        downloader: Downloader,
        storage: Arc<S>,
    ) -> Self {
        Self {
            webui,
            models: ModelManager::new(Arc::clone(&storage), downloader.clone()),
            provisioner: Provisioner::new(storage, downloader),
            models_list: config.provision.models_list.clone(),
            extensions_list: config.provision.extensions_list.clone(),
        }
    }

    pub fn webui(&self) -> &WebUiClient {
        &self.webui
    }

    /// 處理 `{"input": {...}}` 封包
    pub async fn handle_event(&self, event: &Value) -> Result<Value> {
        let input = event
            .get("input")
            .filter(|input| input.is_object())
            .ok_or_else(|| WorkerError::invalid_input("Job event must contain an 'input' object"))?;
        self.handle(input).await
    }

    pub async fn handle(&self, input: &Value) -> Result<Value> {
        let action = match input.get("action").and_then(Value::as_str) {
            Some(name) => name.parse()?,
            None => Action::DEFAULT,
        };
        let action_name = action.as_str();
        tracing::info!("🎬 Handling action: {}", action_name);

        match action {
            Action::ListComponents => self.list_components().await,
            Action::ListModels => {
                let params: ListModelsInput = parse_input(action_name, input)?;
                self.models.list(params.model_type.as_deref()).await
            }
            Action::DownloadModel => {
                let params: DownloadModelInput = parse_input(action_name, input)?;
                let filepath = self.models.download(&params).await?;
                Ok(json!({ "message": format!("Model downloaded to {}", filepath.display()) }))
            }
            Action::DeleteModel => {
                let params: DeleteModelInput = parse_input(action_name, input)?;
                Ok(json!({ "message": self.models.delete(&params).await? }))
            }
            Action::RenameModel => {
                let params: RenameModelInput = parse_input(action_name, input)?;
                Ok(json!({ "message": self.models.rename(&params).await? }))
            }
            Action::GenerateImage => {
                let params = GenerateInput::from_input(action_name, input)?;
                self.validate_generation(&params).await?;
                let payload = Txt2ImgPayload::from_input(&params);
                let result = self.webui.txt2img(&payload).await?;
                Ok(json!({ "images": take_field(result, "images", "txt2img")? }))
            }
            Action::Img2Img => {
                let params = Img2ImgInput::from_input(action_name, input)?;
                self.validate_generation(&params.generate).await?;
                let payload = Img2ImgPayload::from_input(&params);
                let result = self.webui.img2img(&payload).await?;
                Ok(json!({ "images": take_field(result, "images", "img2img")? }))
            }
            Action::FaceSwap => {
                let params = FaceSwapInput::from_input(action_name, input)?;
                let result = self.webui.reactor_swap(&params).await?;
                Ok(json!({ "image": take_field(result, "image", "reactor")? }))
            }
            Action::ReactorModels => Ok(json!({ "models": self.webui.reactor_models().await? })),
            Action::RefreshCheckpoints => {
                Ok(json!({ "refreshed": self.webui.refresh_checkpoints().await? }))
            }
            Action::GetOptions => self.webui.options().await,
            Action::SetOptions => {
                let params: SetOptionsInput = parse_input(action_name, input)?;
                let options = params.options.ok_or_else(|| {
                    WorkerError::invalid_input("options object is required for set_options action")
                })?;
                self.webui.set_options(&options).await
            }
            Action::ListExtensions => self.webui.extensions().await,
            Action::InstallModels => {
                let params: InstallInput = parse_input(action_name, input)?;
                let path = Provisioner::<S>::default_list_path(
                    params.list_path.as_deref(),
                    &self.models_list,
                );
                let report = self.provisioner.install_models(&path).await?;
                Ok(serde_json::to_value(report)?)
            }
            Action::InstallExtensions => {
                let params: InstallInput = parse_input(action_name, input)?;
                let path = Provisioner::<S>::default_list_path(
                    params.list_path.as_deref(),
                    &self.extensions_list,
                );
                let report = self.provisioner.install_extensions(&path).await?;
                Ok(serde_json::to_value(report)?)
            }
            Action::Restart => {
                self.webui.restart().await?;
                Ok(json!({ "message": "WebUI restart requested" }))
            }
        }
    }

    async fn list_components(&self) -> Result<Value> {
        Ok(json!({
            "models": self.webui.available_models().await?,
            "loras": self.webui.available_loras().await?,
            "embeddings": self.webui.available_embeddings().await?,
            "vaes": self.models.available_vaes().await?,
            "controlnet_models": self.webui.controlnet_models().await?,
            "controlnet_modules": self.webui.controlnet_modules().await?,
        }))
    }

    /// 生成前確認所有引用的模型、LoRA、embedding、VAE 與 ControlNet 都存在
    pub async fn validate_generation(&self, input: &GenerateInput) -> Result<()> {
        let available_models = self.webui.available_models().await?;
        if let Some(model) = input.model() {
            if !available_models.iter().any(|m| m == model) {
                return Err(WorkerError::invalid_input(format!(
                    "Model {} not found. Available models: {:?}",
                    model, available_models
                )));
            }
        }

        let available_loras = self.webui.available_loras().await?;
        for lora in &input.loras {
            if !available_loras.contains(&lora.name) {
                return Err(WorkerError::invalid_input(format!(
                    "LoRA {} not found. Available LoRAs: {:?}",
                    lora.name, available_loras
                )));
            }
        }

        let available_embeddings = self.webui.available_embeddings().await?;
        for embedding in &input.embeddings {
            if !available_embeddings.contains(embedding) {
                return Err(WorkerError::invalid_input(format!(
                    "Embedding {} not found. Available embeddings: {:?}",
                    embedding, available_embeddings
                )));
            }
        }

        let available_vaes = self.models.available_vaes().await?;
        if let Some(vae) = input.vae() {
            if !available_vaes.iter().any(|v| v == vae) {
                return Err(WorkerError::invalid_input(format!(
                    "VAE {} not found. Available VAEs: {:?}",
                    vae, available_vaes
                )));
            }
        }

        let available_cn_models = self.webui.controlnet_models().await?;
        let available_cn_modules = self.webui.controlnet_modules().await?;
        for unit in &input.controlnet_units {
            if !available_cn_models.contains(&unit.model) {
                return Err(WorkerError::invalid_input(format!(
                    "ControlNet model {} not found. Available models: {:?}",
                    unit.model, available_cn_models
                )));
            }
            if !available_cn_modules.contains(&unit.module) {
                return Err(WorkerError::invalid_input(format!(
                    "ControlNet module {} not found. Available modules: {:?}",
                    unit.module, available_cn_modules
                )));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl<S: ModelStorage> JobExecutor for JobHandler<S> {
    async fn execute(&self, input: &Value) -> Result<Value> {
        self.handle(input).await
    }
}

fn take_field(mut result: Value, key: &str, operation: &str) -> Result<Value> {
    result
        .get_mut(key)
        .map(Value::take)
        .filter(|value| !value.is_null())
        .ok_or_else(|| WorkerError::Upstream {
            context: format!("{} response had no '{}' field", operation, key),
            status: 200,
            body: String::new(),
        })
}
