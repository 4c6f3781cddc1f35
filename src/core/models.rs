use crate::core::download::{filename_from_response, filename_from_url, Downloader};
use crate::domain::input::{DeleteModelInput, DownloadModelInput, RenameModelInput};
use crate::domain::model::{ModelType, VAE_EXTENSIONS, VALID_EXTENSIONS};
use crate::domain::ports::ModelStorage;
use crate::utils::error::{Result, WorkerError};
use crate::utils::validation::{
    lowercase_extension, require_str, validate_file_name, validate_model_extension,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 模型檔案的列出、下載、刪除與改名
pub struct ModelManager<S: ModelStorage> {
    storage: Arc<S>,
    downloader: Downloader,
}

impl<S: ModelStorage> ModelManager<S> {
    pub fn new(storage: Arc<S>, downloader: Downloader) -> Self {
        Self {
            storage,
            downloader,
        }
    }

    /// 指定種類時回傳陣列，否則回傳以種類為鍵的物件
    pub async fn list(&self, model_type: Option<&str>) -> Result<Value> {
        if let Some(model_type) = model_type {
            let model_type: ModelType = model_type.parse()?;
            let files = self
                .storage
                .list_files(self.storage.model_dir(model_type), &VALID_EXTENSIONS)
                .await?;
            tracing::info!("📋 {} {} model(s) found", files.len(), model_type);
            return Ok(serde_json::to_value(files)?);
        }

        let mut result = Map::new();
        for model_type in ModelType::ALL {
            let files = self
                .storage
                .list_files(self.storage.model_dir(model_type), &VALID_EXTENSIONS)
                .await?;
            result.insert(model_type.to_string(), serde_json::to_value(files)?);
        }
        tracing::info!("📋 Model list built for all types");
        Ok(Value::Object(result))
    }

    /// VAE 直接從目錄讀取，WebUI 沒有對應的 API
    pub async fn available_vaes(&self) -> Result<Vec<String>> {
        let files = self
            .storage
            .list_files(self.storage.model_dir(ModelType::Vae), &VAE_EXTENSIONS)
            .await?;
        if files.is_empty() {
            tracing::debug!("No VAEs found");
        }
        Ok(files.into_iter().map(|f| f.name).collect())
    }

    pub async fn download(&self, input: &DownloadModelInput) -> Result<PathBuf> {
        let url = require_str("url", input.url.as_deref())
            .map_err(|_| WorkerError::invalid_input("url is required for download_model action"))?;

        let response = self
            .downloader
            .open(url, input.civitai_token.as_deref().filter(|t| !t.is_empty()))
            .await?;

        let filename = filename_from_response(&response)
            .or_else(|| filename_from_url(url))
            .unwrap_or_else(|| "downloaded_model".to_string());

        let extension = lowercase_extension(&filename);
        validate_model_extension(&filename, &VALID_EXTENSIONS)?;

        let model_type = match input.model_type.as_deref().filter(|t| !t.is_empty()) {
            Some(model_type) => model_type.parse()?,
            None => ModelType::infer(url, &extension)?,
        };

        let model_dir = match input.custom_dir.as_deref().map(Path::new) {
            Some(dir) if dir.is_dir() => dir.to_path_buf(),
            _ => self.storage.model_dir(model_type).to_path_buf(),
        };

        let filepath = model_dir.join(&filename);
        tracing::info!("📥 Downloading {} model {} to {}", model_type, filename, model_dir.display());
        self.downloader.save(response, &filepath).await?;
        tracing::info!("✅ Model downloaded to {}", filepath.display());
        Ok(filepath)
    }

    pub async fn delete(&self, input: &DeleteModelInput) -> Result<String> {
        if let Some(path) = input.path.as_deref().filter(|p| !p.is_empty()) {
            let path = Path::new(path);
            if !path.is_file() {
                return Err(WorkerError::not_found(format!(
                    "File not found at path: {}",
                    path.display()
                )));
            }
            if !self.storage.is_managed_path(path).await {
                return Err(WorkerError::invalid_input(format!(
                    "Path {} is outside the model directories",
                    path.display()
                )));
            }
            self.storage.remove_file(path).await?;
            let message = format!("Model at {} deleted", path.display());
            tracing::info!("🗑️ {}", message);
            return Ok(message);
        }

        let (Some(model_name), Some(model_type)) = (
            input.model_name.as_deref().filter(|n| !n.is_empty()),
            input.model_type.as_deref().filter(|t| !t.is_empty()),
        ) else {
            return Err(WorkerError::invalid_input(
                "model_name and model_type are required unless path is provided",
            ));
        };

        let model_type: ModelType = model_type.parse()?;
        validate_file_name("model_name", model_name)?;
        let filepath = self.storage.resolve(model_type, model_name);
        if !filepath.is_file() {
            return Err(WorkerError::not_found(format!(
                "Model {} not found in {} directory",
                model_name, model_type
            )));
        }

        self.storage.remove_file(&filepath).await?;
        let message = format!("Model {} of type {} deleted", model_name, model_type);
        tracing::info!("🗑️ {}", message);
        Ok(message)
    }

    pub async fn rename(&self, input: &RenameModelInput) -> Result<String> {
        let model_name = require_str("model_name", input.model_name.as_deref())?;
        let new_name = require_str("new_name", input.new_name.as_deref())?;
        let model_type: ModelType = require_str("model_type", input.model_type.as_deref())?.parse()?;

        validate_file_name("model_name", model_name)?;
        validate_file_name("new_name", new_name)?;
        validate_model_extension(new_name, &VALID_EXTENSIONS)?;

        let from = self.storage.resolve(model_type, model_name);
        let to = self.storage.resolve(model_type, new_name);
        if !from.is_file() {
            return Err(WorkerError::not_found(format!(
                "Model {} not found in {} directory",
                model_name, model_type
            )));
        }
        if to.exists() {
            return Err(WorkerError::invalid_input(format!(
                "Model {} already exists in {} directory",
                new_name, model_type
            )));
        }

        self.storage.rename_file(&from, &to).await?;
        let message = format!("Model {} renamed to {}", model_name, new_name);
        tracing::info!("✏️ {}", message);
        Ok(message)
    }
}
