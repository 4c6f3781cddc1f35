use crate::config::toml_config::WorkerConfig;
use crate::config::CliConfig;
use crate::utils::error::Result;
use clap::Subcommand;

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Wait for the WebUI, refresh checkpoints and process queue jobs
    Serve {
        /// Handle this job file once and exit (defaults to ./test_input.json when present)
        #[arg(long)]
        test_input: Option<String>,

        /// Skip the readiness wait
        #[arg(long)]
        skip_wait: bool,
    },

    /// Handle a single job envelope from a JSON file
    RunJob {
        /// Job file containing {"input": {...}}
        input: String,

        /// Decode returned images into this directory
        #[arg(long)]
        output_dir: Option<String>,
    },

    /// Block until the WebUI answers HTTP
    Wait {
        /// Give up after this many seconds
        #[arg(long)]
        max_wait_secs: Option<u64>,
    },

    /// Download models and clone extensions from the configured lists
    Provision {
        /// Model list (`type|url` or `type url` per line)
        #[arg(long)]
        models: Option<String>,

        /// Extension list (one repository URL per line)
        #[arg(long)]
        extensions: Option<String>,
    },
}

impl CliConfig {
    /// 設定優先順序：CLI 參數 > 環境變數 > 設定檔 > 預設值
    pub fn load_worker_config(&self) -> Result<WorkerConfig> {
        let mut config = match &self.config {
            Some(path) => WorkerConfig::from_file(path)?,
            None => WorkerConfig::default(),
        };
        config.apply_env();

        if let Some(api_root) = &self.api_root {
            config.webui.api_root = api_root.clone();
        }
        if let Command::Provision { models, extensions } = &self.command {
            if let Some(models) = models {
                config.provision.models_list = models.clone();
            }
            if let Some(extensions) = extensions {
                config.provision.extensions_list = extensions.clone();
            }
        }
        if let Command::Wait {
            max_wait_secs: Some(secs),
        } = &self.command
        {
            config.readiness.max_wait_secs = Some(*secs);
        }

        Ok(config)
    }
}
