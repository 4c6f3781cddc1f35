use crate::utils::error::{Result, WorkerError};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// WebUI 可接受的權重檔副檔名
pub const VALID_EXTENSIONS: [&str; 4] = [".ckpt", ".safetensors", ".pt", ".bin"];

/// VAE 清單只認這兩種格式
pub const VAE_EXTENSIONS: [&str; 2] = [".pt", ".safetensors"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Checkpoint,
    Lora,
    Embedding,
    Vae,
    Controlnet,
    T2iAdapter,
}

impl ModelType {
    pub const ALL: [ModelType; 6] = [
        ModelType::Checkpoint,
        ModelType::Lora,
        ModelType::Embedding,
        ModelType::Vae,
        ModelType::Controlnet,
        ModelType::T2iAdapter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Checkpoint => "checkpoint",
            ModelType::Lora => "lora",
            ModelType::Embedding => "embedding",
            ModelType::Vae => "vae",
            ModelType::Controlnet => "controlnet",
            ModelType::T2iAdapter => "t2i_adapter",
        }
    }

    /// 相對於 WebUI 根目錄的預設存放位置
    pub fn default_subdir(&self) -> &'static str {
        match self {
            ModelType::Checkpoint => "models/Stable-diffusion",
            ModelType::Lora => "models/Lora",
            ModelType::Embedding => "embeddings",
            ModelType::Vae => "models/VAE",
            ModelType::Controlnet | ModelType::T2iAdapter => {
                "extensions/sd-webui-controlnet/models"
            }
        }
    }

    /// 依 URL 與副檔名推測模型種類
    pub fn infer(url: &str, extension: &str) -> Result<Self> {
        let url = url.to_lowercase();
        match extension {
            ".ckpt" | ".safetensors" => Ok(if url.contains("checkpoint") {
                ModelType::Checkpoint
            } else if url.contains("lora") {
                ModelType::Lora
            } else {
                ModelType::Vae
            }),
            ".pt" => Ok(if url.contains("embedding") {
                ModelType::Embedding
            } else {
                ModelType::Lora
            }),
            ".bin" => Ok(if url.contains("controlnet") {
                ModelType::Controlnet
            } else {
                ModelType::T2iAdapter
            }),
            _ => Err(WorkerError::invalid_input(
                "Cannot infer model type from URL and extension",
            )),
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "checkpoint" => Ok(ModelType::Checkpoint),
            "lora" => Ok(ModelType::Lora),
            "embedding" | "embeddings" => Ok(ModelType::Embedding),
            "vae" => Ok(ModelType::Vae),
            "controlnet" => Ok(ModelType::Controlnet),
            "t2i_adapter" => Ok(ModelType::T2iAdapter),
            other => Err(WorkerError::invalid_input(format!(
                "Invalid model type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFileInfo {
    pub name: String,
    pub size: u64,
    /// 修改時間（epoch 秒）
    pub modified: f64,
    pub path: String,
}

/// 佇列送來的 job：`{"id": ..., "input": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(default, deserialize_with = "deserialize_job_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub input: Option<serde_json::Value>,
}

/// 字串或數字形式的 job id
fn job_id_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(id) => Some(id.clone()),
        serde_json::Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn deserialize_job_id<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<String>, D::Error> {
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => job_id_text(&value)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("job id must be a string or number, got {}", value))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ListComponents,
    ListModels,
    DownloadModel,
    DeleteModel,
    RenameModel,
    GenerateImage,
    Img2Img,
    FaceSwap,
    ReactorModels,
    RefreshCheckpoints,
    GetOptions,
    SetOptions,
    ListExtensions,
    InstallModels,
    InstallExtensions,
    Restart,
}

impl Action {
    /// 未指定 `action` 時的動作
    pub const DEFAULT: Action = Action::GenerateImage;

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ListComponents => "list_components",
            Action::ListModels => "list_models",
            Action::DownloadModel => "download_model",
            Action::DeleteModel => "delete_model",
            Action::RenameModel => "rename_model",
            Action::GenerateImage => "generate_image",
            Action::Img2Img => "img2img",
            Action::FaceSwap => "face_swap",
            Action::ReactorModels => "reactor_models",
            Action::RefreshCheckpoints => "refresh_checkpoints",
            Action::GetOptions => "get_options",
            Action::SetOptions => "set_options",
            Action::ListExtensions => "list_extensions",
            Action::InstallModels => "install_models",
            Action::InstallExtensions => "install_extensions",
            Action::Restart => "restart",
        }
    }
}

impl FromStr for Action {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "list_components" => Action::ListComponents,
            "list_models" => Action::ListModels,
            "download_model" => Action::DownloadModel,
            "delete_model" => Action::DeleteModel,
            "rename_model" => Action::RenameModel,
            "generate_image" => Action::GenerateImage,
            "img2img" => Action::Img2Img,
            "face_swap" => Action::FaceSwap,
            "reactor_models" => Action::ReactorModels,
            "refresh_checkpoints" => Action::RefreshCheckpoints,
            "get_options" => Action::GetOptions,
            "set_options" => Action::SetOptions,
            "list_extensions" => Action::ListExtensions,
            "install_models" => Action::InstallModels,
            "install_extensions" => Action::InstallExtensions,
            "restart" => Action::Restart,
            other => {
                return Err(WorkerError::UnknownAction {
                    action: other.to_string(),
                })
            }
        })
    }
}

/// 安裝清單（models.txt / extensions.txt）的處理結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub installed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

impl ProvisionReport {
    pub fn merge(&mut self, other: ProvisionReport) {
        self.installed.extend(other.installed);
        self.skipped.extend(other.skipped);
        self.failed.extend(other.failed);
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}
