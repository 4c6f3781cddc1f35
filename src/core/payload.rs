use crate::domain::input::{ControlNetUnitInput, GenerateInput, Img2ImgInput, LoraSpec};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// 在提示詞後附加 `<lora:name:weight>` 與 embedding 名稱
pub fn construct_prompt(base_prompt: &str, loras: &[LoraSpec], embeddings: &[String]) -> String {
    let mut prompt = base_prompt.to_string();
    for lora in loras {
        prompt.push_str(&format!(" <lora:{}:{}>", lora.name, lora.weight_text()));
    }
    for embedding in embeddings {
        prompt.push(' ');
        prompt.push_str(embedding);
    }
    tracing::debug!("Constructed prompt: {}", prompt);
    prompt
}

/// extra 內的鍵會覆蓋 model / vae 設定
pub fn override_settings(
    model_name: Option<&str>,
    vae_name: Option<&str>,
    extra: &Map<String, Value>,
) -> Map<String, Value> {
    let mut settings = Map::new();
    if let Some(model) = model_name {
        settings.insert("sd_model_checkpoint".to_string(), json!(model));
    }
    if let Some(vae) = vae_name {
        settings.insert("sd_vae".to_string(), json!(vae));
    }
    settings.extend(extra.clone());
    tracing::debug!("Override settings: {:?}", settings);
    settings
}

/// ControlNet 擴充套件的單一 unit 參數
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlNetArgs {
    pub input_image: Option<String>,
    pub model: String,
    pub module: String,
    pub weight: f64,
    pub resize_mode: Value,
    pub control_mode: Value,
    pub pixel_perfect: bool,
    pub mask: Option<String>,
    pub lowvram: bool,
    pub processor_res: i64,
    pub threshold_a: f64,
    pub threshold_b: f64,
    pub guidance_start: f64,
    pub guidance_end: f64,
}

impl From<&ControlNetUnitInput> for ControlNetArgs {
    fn from(unit: &ControlNetUnitInput) -> Self {
        Self {
            input_image: unit.input_image.clone(),
            model: unit.model.clone(),
            module: unit.module.clone(),
            weight: unit.weight.unwrap_or(1.0),
            resize_mode: unit
                .resize_mode
                .clone()
                .unwrap_or_else(|| json!("Just Resize")),
            control_mode: unit
                .control_mode
                .clone()
                .unwrap_or_else(|| json!("Balanced")),
            pixel_perfect: unit.pixel_perfect.unwrap_or(false),
            mask: unit.mask.clone(),
            lowvram: unit.lowvram.unwrap_or(false),
            processor_res: unit.processor_res.unwrap_or(64),
            threshold_a: unit.threshold_a.unwrap_or(64.0),
            threshold_b: unit.threshold_b.unwrap_or(64.0),
            guidance_start: unit.guidance_start.unwrap_or(0.0),
            guidance_end: unit.guidance_end.unwrap_or(1.0),
        }
    }
}

pub fn alwayson_scripts(
    units: &[ControlNetUnitInput],
    extra: &Map<String, Value>,
) -> Map<String, Value> {
    let mut scripts = Map::new();
    if !units.is_empty() {
        let args: Vec<ControlNetArgs> = units.iter().map(ControlNetArgs::from).collect();
        scripts.insert("controlnet".to_string(), json!({ "args": args }));
    }
    scripts.extend(extra.clone());
    tracing::debug!("Alwayson scripts: {:?}", scripts);
    scripts
}

/// `/sdapi/v1/txt2img` 的請求本體
#[derive(Debug, Clone, Serialize)]
pub struct Txt2ImgPayload {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub seed: i64,
    pub sampler_index: String,
    pub batch_size: u32,
    pub n_iter: u32,
    pub cfg_scale: f64,
    pub override_settings: Map<String, Value>,
    pub alwayson_scripts: Map<String, Value>,
}

impl Txt2ImgPayload {
    pub fn from_input(input: &GenerateInput) -> Self {
        Self {
            prompt: construct_prompt(&input.prompt, &input.loras, &input.embeddings),
            negative_prompt: input.negative_prompt.clone(),
            width: input.width,
            height: input.height,
            steps: input.steps,
            seed: input.seed,
            sampler_index: input.sampler_index.clone(),
            batch_size: input.batch_size,
            n_iter: input.n_iter,
            cfg_scale: input.cfg_scale,
            override_settings: override_settings(
                input.model(),
                input.vae(),
                &input.extra_override_settings,
            ),
            alwayson_scripts: alwayson_scripts(
                &input.controlnet_units,
                &input.extra_alwayson_scripts,
            ),
        }
    }
}

/// `/sdapi/v1/img2img` 的請求本體：txt2img 欄位加上初始圖片與遮罩設定
#[derive(Debug, Clone, Serialize)]
pub struct Img2ImgPayload {
    #[serde(flatten)]
    pub base: Txt2ImgPayload,
    pub init_images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<String>,
    pub denoising_strength: f64,
    pub resize_mode: u32,
    pub mask_blur: u32,
    pub inpainting_fill: u32,
    pub inpaint_full_res: bool,
    pub inpaint_full_res_padding: u32,
    pub inpainting_mask_invert: u32,
}

impl Img2ImgPayload {
    pub fn from_input(input: &Img2ImgInput) -> Self {
        Self {
            base: Txt2ImgPayload::from_input(&input.generate),
            init_images: input.init_images.clone(),
            mask: input.mask.clone(),
            denoising_strength: input.denoising_strength,
            resize_mode: input.resize_mode,
            mask_blur: input.mask_blur,
            inpainting_fill: input.inpainting_fill,
            inpaint_full_res: input.inpaint_full_res,
            inpaint_full_res_padding: input.inpaint_full_res_padding,
            inpainting_mask_invert: input.inpainting_mask_invert,
        }
    }
}
