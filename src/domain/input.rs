//! Job input 的型別。欄位名稱與預設值對應 WebUI 的 API 參數。

use crate::utils::error::{Result, WorkerError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 將 job input 解析為指定型別，錯誤轉為 `InvalidInput`
pub fn parse_input<T: DeserializeOwned>(action: &str, input: &Value) -> Result<T> {
    serde_json::from_value(input.clone()).map_err(|e| {
        WorkerError::invalid_input(format!("Invalid input for {}: {}", action, e))
    })
}

/// 空字串視為未提供
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoraSpec {
    pub name: String,
    pub weight: Value,
}

impl LoraSpec {
    /// `<lora:name:weight>` 中的權重文字
    pub fn weight_text(&self) -> String {
        match &self.weight {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlNetUnitInput {
    pub model: String,
    pub module: String,
    #[serde(default)]
    pub input_image: Option<String>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
    #[serde(default)]
    pub resize_mode: Option<Value>,
    #[serde(default)]
    pub control_mode: Option<Value>,
    #[serde(default)]
    pub pixel_perfect: Option<bool>,
    #[serde(default)]
    pub lowvram: Option<bool>,
    #[serde(default)]
    pub processor_res: Option<i64>,
    #[serde(default)]
    pub threshold_a: Option<f64>,
    #[serde(default)]
    pub threshold_b: Option<f64>,
    #[serde(default)]
    pub guidance_start: Option<f64>,
    #[serde(default)]
    pub guidance_end: Option<f64>,
}

fn default_dimension() -> u32 {
    512
}

fn default_steps() -> u32 {
    20
}

fn default_seed() -> i64 {
    -1
}

fn default_sampler() -> String {
    "Euler a".to_string()
}

fn default_one() -> u32 {
    1
}

fn default_cfg_scale() -> f64 {
    7.5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateInput {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub loras: Vec<LoraSpec>,
    #[serde(default)]
    pub embeddings: Vec<String>,
    #[serde(default)]
    pub vae_name: Option<String>,
    #[serde(default)]
    pub controlnet_units: Vec<ControlNetUnitInput>,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default = "default_sampler")]
    pub sampler_index: String,
    #[serde(default = "default_one")]
    pub batch_size: u32,
    #[serde(default = "default_one")]
    pub n_iter: u32,
    #[serde(default = "default_cfg_scale")]
    pub cfg_scale: f64,
    #[serde(default)]
    pub extra_override_settings: Map<String, Value>,
    #[serde(default)]
    pub extra_alwayson_scripts: Map<String, Value>,
}

impl GenerateInput {
    /// 先檢查 LoRA 與 ControlNet 的必要欄位，再交給 serde 解析
    pub fn from_input(action: &str, input: &Value) -> Result<Self> {
        check_required_keys(
            input,
            "loras",
            &["name", "weight"],
            "Each LoRA must have 'name' and 'weight' fields",
        )?;
        check_required_keys(
            input,
            "controlnet_units",
            &["model", "module"],
            "Each controlnet unit must have 'model' and 'module' fields",
        )?;
        parse_input(action, input)
    }

    pub fn model(&self) -> Option<&str> {
        non_empty(&self.model_name)
    }

    pub fn vae(&self) -> Option<&str> {
        non_empty(&self.vae_name)
    }
}

fn check_required_keys(input: &Value, list_key: &str, keys: &[&str], message: &str) -> Result<()> {
    let Some(items) = input.get(list_key).and_then(Value::as_array) else {
        return Ok(());
    };
    for item in items {
        let complete = item
            .as_object()
            .map(|obj| keys.iter().all(|key| obj.contains_key(*key)))
            .unwrap_or(false);
        if !complete {
            return Err(WorkerError::invalid_input(message));
        }
    }
    Ok(())
}

fn default_denoising_strength() -> f64 {
    0.75
}

fn default_mask_blur() -> u32 {
    4
}

fn default_inpainting_fill() -> u32 {
    1
}

fn default_inpaint_padding() -> u32 {
    32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Img2ImgInput {
    #[serde(flatten)]
    pub generate: GenerateInput,
    #[serde(default)]
    pub init_images: Vec<String>,
    #[serde(default)]
    pub mask: Option<String>,
    #[serde(default = "default_denoising_strength")]
    pub denoising_strength: f64,
    #[serde(default)]
    pub resize_mode: u32,
    #[serde(default = "default_mask_blur")]
    pub mask_blur: u32,
    #[serde(default = "default_inpainting_fill")]
    pub inpainting_fill: u32,
    #[serde(default)]
    pub inpaint_full_res: bool,
    #[serde(default = "default_inpaint_padding")]
    pub inpaint_full_res_padding: u32,
    #[serde(default)]
    pub inpainting_mask_invert: u32,
}

impl Img2ImgInput {
    pub fn from_input(action: &str, input: &Value) -> Result<Self> {
        // 共用 generate 欄位的檢查
        GenerateInput::from_input(action, input)?;
        let parsed: Self = parse_input(action, input)?;
        if parsed.init_images.is_empty() {
            return Err(WorkerError::invalid_input(
                "init_images is required for img2img action",
            ));
        }
        Ok(parsed)
    }
}

fn default_face_indices() -> Vec<u32> {
    vec![0]
}

fn default_none_label() -> String {
    "None".to_string()
}

fn default_unit_f64() -> f64 {
    1.0
}

fn default_codeformer_weight() -> f64 {
    0.5
}

fn default_swap_model() -> String {
    "inswapper_128.onnx".to_string()
}

fn default_device() -> String {
    "CPU".to_string()
}

/// ReActor `/reactor/image` 的請求本體；未提供的欄位使用擴充套件的預設值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceSwapInput {
    #[serde(default)]
    pub source_image: String,
    #[serde(default)]
    pub target_image: String,
    #[serde(default = "default_face_indices")]
    pub source_faces_index: Vec<u32>,
    #[serde(default = "default_face_indices")]
    pub face_index: Vec<u32>,
    #[serde(default = "default_none_label")]
    pub upscaler: String,
    #[serde(default = "default_unit_f64")]
    pub scale: f64,
    #[serde(default = "default_unit_f64")]
    pub upscale_visibility: f64,
    #[serde(default = "default_none_label")]
    pub face_restorer: String,
    #[serde(default = "default_unit_f64")]
    pub restorer_visibility: f64,
    #[serde(default = "default_codeformer_weight")]
    pub codeformer_weight: f64,
    #[serde(default = "default_one")]
    pub restore_first: u32,
    #[serde(default = "default_swap_model")]
    pub model: String,
    #[serde(default)]
    pub gender_source: u32,
    #[serde(default)]
    pub gender_target: u32,
    #[serde(default)]
    pub save_to_file: u32,
    #[serde(default)]
    pub result_file_path: String,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default)]
    pub mask_face: u32,
    #[serde(default)]
    pub select_source: u32,
    #[serde(default = "default_none_label")]
    pub face_model: String,
}

impl FaceSwapInput {
    pub fn from_input(action: &str, input: &Value) -> Result<Self> {
        let parsed: Self = parse_input(action, input)?;
        if parsed.source_image.is_empty() || parsed.target_image.is_empty() {
            return Err(WorkerError::invalid_input(
                "source_image and target_image are required for face_swap action",
            ));
        }
        Ok(parsed)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListModelsInput {
    #[serde(default)]
    pub model_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadModelInput {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub civitai_token: Option<String>,
    #[serde(default)]
    pub custom_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteModelInput {
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenameModelInput {
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub model_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstallInput {
    #[serde(default)]
    pub list_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetOptionsInput {
    #[serde(default)]
    pub options: Option<Map<String, Value>>,
}
