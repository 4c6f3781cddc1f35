use crate::adapters::http::RetryPolicy;
use crate::domain::model::ModelType;
use crate::utils::error::{Result, WorkerError};
use crate::utils::validation::{
    validate_http_status, validate_path, validate_positive_number, validate_range, validate_url,
    Validate,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub webui: WebUiConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub provision: ProvisionConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebUiConfig {
    /// WebUI 的根網址；API 位於 `{api_root}/sdapi/v1`
    #[serde(default = "default_api_root")]
    pub api_root: String,
    /// 啟動時是否先呼叫 refresh-checkpoints
    #[serde(default = "default_true")]
    pub refresh_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_retry_total")]
    pub retry_total: u32,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
    #[serde(default = "default_status_forcelist")]
    pub status_forcelist: Vec<u16>,
    #[serde(default = "default_true")]
    pub respect_retry_after: bool,
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_inference_timeout_secs")]
    pub inference_timeout_secs: u64,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_readiness_path")]
    pub path: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_readiness_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_log_every")]
    pub log_every: u32,
    /// 未設定時無限等待
    #[serde(default)]
    pub max_wait_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_webui_root")]
    pub webui_root: String,
    /// 針對個別模型種類覆寫目錄，例如 `lora = "/workspace/loras"`
    #[serde(default)]
    pub model_dirs: HashMap<String, String>,
    #[serde(default)]
    pub extensions_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    #[serde(default = "default_models_list")]
    pub models_list: String,
    #[serde(default = "default_extensions_list")]
    pub extensions_list: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    /// 取得 job 的網址，`$ID` 會被替換成 worker id
    #[serde(default)]
    pub job_take_url: Option<String>,
    /// 回報結果的網址，`$ID` 會被替換成 job id
    #[serde(default)]
    pub job_done_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub worker_id: Option<String>,
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

fn default_api_root() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_true() -> bool {
    true
}

fn default_retry_total() -> u32 {
    10
}

fn default_backoff_factor() -> f64 {
    0.1
}

fn default_backoff_max_secs() -> u64 {
    120
}

fn default_status_forcelist() -> Vec<u16> {
    vec![502, 503, 504]
}

fn default_query_timeout_secs() -> u64 {
    60
}

fn default_inference_timeout_secs() -> u64 {
    600
}

fn default_download_timeout_secs() -> u64 {
    30
}

fn default_readiness_path() -> String {
    "/sdapi/v1/sd-models".to_string()
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_readiness_timeout_secs() -> u64 {
    120
}

fn default_log_every() -> u32 {
    15
}

fn default_webui_root() -> String {
    "/stable-diffusion-webui".to_string()
}

fn default_models_list() -> String {
    "/models.txt".to_string()
}

fn default_extensions_list() -> String {
    "/extensions.txt".to_string()
}

fn default_idle_poll_ms() -> u64 {
    1000
}

impl Default for WebUiConfig {
    fn default() -> Self {
        Self {
            api_root: default_api_root(),
            refresh_on_start: true,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            retry_total: default_retry_total(),
            backoff_factor: default_backoff_factor(),
            backoff_max_secs: default_backoff_max_secs(),
            status_forcelist: default_status_forcelist(),
            respect_retry_after: true,
            query_timeout_secs: default_query_timeout_secs(),
            inference_timeout_secs: default_inference_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
        }
    }
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            path: default_readiness_path(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_readiness_timeout_secs(),
            log_every: default_log_every(),
            max_wait_secs: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            webui_root: default_webui_root(),
            model_dirs: HashMap::new(),
            extensions_dir: None,
        }
    }
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            models_list: default_models_list(),
            extensions_list: default_extensions_list(),
        }
    }
}

impl HttpConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            total: self.retry_total,
            backoff_factor: self.backoff_factor,
            backoff_max: Duration::from_secs(self.backoff_max_secs),
            status_forcelist: self.status_forcelist.clone(),
            respect_retry_after: self.respect_retry_after,
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

impl ReadinessConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }
}

impl PathsConfig {
    /// 以指定根目錄建立設定，其餘使用預設值
    pub fn rooted_at<P: AsRef<Path>>(webui_root: P) -> Self {
        Self {
            webui_root: webui_root.as_ref().to_string_lossy().into_owned(),
            ..Self::default()
        }
    }

    pub fn model_dir(&self, model_type: ModelType) -> PathBuf {
        match self.model_dirs.get(model_type.as_str()) {
            Some(dir) => PathBuf::from(dir),
            None => Path::new(&self.webui_root).join(model_type.default_subdir()),
        }
    }

    pub fn extensions_dir(&self) -> PathBuf {
        match &self.extensions_dir {
            Some(dir) => PathBuf::from(dir),
            None => Path::new(&self.webui_root).join("extensions"),
        }
    }
}

impl WorkerConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| WorkerError::ConfigError {
            message: format!("Cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| WorkerError::ConfigError {
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${RUNPOD_AI_API_KEY})；未定義的變數保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| WorkerError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 以環境變數覆寫設定（佇列平台透過環境變數提供端點）
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(root) = lookup("WEBUI_API_ROOT") {
            self.webui.api_root = root;
        }
        if let Some(root) = lookup("WEBUI_ROOT") {
            self.paths.webui_root = root;
        }
        if let Some(url) = lookup("RUNPOD_WEBHOOK_GET_JOB") {
            self.queue.job_take_url = Some(url);
        }
        if let Some(url) = lookup("RUNPOD_WEBHOOK_POST_OUTPUT") {
            self.queue.job_done_url = Some(url);
        }
        if let Some(key) = lookup("RUNPOD_AI_API_KEY") {
            self.queue.api_key = Some(key);
        }
        if let Some(id) = lookup("RUNPOD_POD_ID") {
            self.queue.worker_id = Some(id);
        }
    }

    /// 健康檢查網址
    pub fn readiness_url(&self) -> String {
        format!(
            "{}{}",
            self.webui.api_root.trim_end_matches('/'),
            self.readiness.path
        )
    }

    pub fn queue_enabled(&self) -> bool {
        self.queue.job_take_url.is_some() && self.queue.job_done_url.is_some()
    }
}

impl Validate for WorkerConfig {
    fn validate(&self) -> Result<()> {
        validate_url("webui.api_root", &self.webui.api_root)?;

        validate_range("http.retry_total", self.http.retry_total, 0, 100)?;
        validate_range("http.backoff_factor", self.http.backoff_factor, 0.0, 60.0)?;
        for code in &self.http.status_forcelist {
            validate_http_status("http.status_forcelist", *code)?;
        }
        validate_positive_number("http.query_timeout_secs", self.http.query_timeout_secs, 1)?;
        validate_positive_number(
            "http.inference_timeout_secs",
            self.http.inference_timeout_secs,
            1,
        )?;
        validate_positive_number(
            "http.download_timeout_secs",
            self.http.download_timeout_secs,
            1,
        )?;

        if !self.readiness.path.starts_with('/') {
            return Err(WorkerError::InvalidConfigValueError {
                field: "readiness.path".to_string(),
                value: self.readiness.path.clone(),
                reason: "Path must start with '/'".to_string(),
            });
        }
        validate_positive_number("readiness.log_every", u64::from(self.readiness.log_every), 1)?;

        validate_path("paths.webui_root", &self.paths.webui_root)?;
        for (model_type, dir) in &self.paths.model_dirs {
            model_type
                .parse::<ModelType>()
                .map_err(|_| WorkerError::InvalidConfigValueError {
                    field: "paths.model_dirs".to_string(),
                    value: model_type.clone(),
                    reason: "Unknown model type".to_string(),
                })?;
            validate_path(&format!("paths.model_dirs.{}", model_type), dir)?;
        }
        validate_path("provision.models_list", &self.provision.models_list)?;
        validate_path("provision.extensions_list", &self.provision.extensions_list)?;

        if let Some(url) = &self.queue.job_take_url {
            validate_url("queue.job_take_url", url)?;
        }
        if let Some(url) = &self.queue.job_done_url {
            validate_url("queue.job_done_url", url)?;
        }
        if self.queue.job_take_url.is_some() != self.queue.job_done_url.is_some() {
            return Err(WorkerError::MissingConfigError {
                field: "queue.job_take_url / queue.job_done_url (both or neither)".to_string(),
            });
        }

        Ok(())
    }
}
