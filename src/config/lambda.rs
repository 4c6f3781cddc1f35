use crate::config::toml_config::WorkerConfig;
use crate::utils::error::Result;
use crate::utils::validation::Validate;
use std::env;

/// Lambda 沒有命令列參數，設定檔位置與覆寫都來自環境變數
#[derive(Debug, Clone)]
pub struct LambdaConfig {
    pub worker: WorkerConfig,
    pub wait_for_service: bool,
}

impl LambdaConfig {
    pub fn from_env() -> Result<Self> {
        let mut worker = match env::var("SD_WORKER_CONFIG") {
            Ok(path) => WorkerConfig::from_file(path)?,
            Err(_) => WorkerConfig::default(),
        };
        worker.apply_env();

        let wait_for_service = env::var("SD_WORKER_WAIT_FOR_SERVICE")
            .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        Ok(Self {
            worker,
            wait_for_service,
        })
    }
}

impl Validate for LambdaConfig {
    fn validate(&self) -> Result<()> {
        self.worker.validate()
    }
}
