use base64::engine::general_purpose;
use base64::Engine;
use clap::Parser;
use sd_worker::config::cli::Command;
use sd_worker::core::download::Downloader;
use sd_worker::core::provision::Provisioner;
use sd_worker::core::readiness::ReadinessProbe;
use sd_worker::core::worker::run_local;
use sd_worker::utils::error::ErrorSeverity;
use sd_worker::utils::monitor::JobMonitor;
use sd_worker::utils::logger::{self, LogFormat};
use sd_worker::utils::validation::Validate;
use sd_worker::{CliConfig, JobHandler, LocalModelStorage, QueueWorker, WorkerConfig, WorkerError};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const DEFAULT_TEST_INPUT: &str = "test_input.json";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 初始化日誌
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    logger::init_logger(format, cli.verbose);

    tracing::info!("Starting sd-worker");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let result = match cli.load_worker_config() {
        Ok(config) => match config.validate() {
            Ok(()) => run(&cli, config).await,
            Err(e) => Err(e),
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        tracing::error!(
            "❌ sd-worker failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 {}", e.recovery_suggestion());

        // 依錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

async fn run(cli: &CliConfig, config: WorkerConfig) -> sd_worker::Result<()> {
    match &cli.command {
        Command::Serve {
            test_input,
            skip_wait,
        } => serve(cli, &config, test_input.as_deref(), *skip_wait).await,
        Command::RunJob { input, output_dir } => {
            run_job(cli, &config, Path::new(input), output_dir.as_deref()).await
        }
        Command::Wait { .. } => {
            ReadinessProbe::new(&config.readiness)
                .wait_for_service(&config.readiness_url())
                .await?;
            println!("✅ WebUI API Service is ready");
            Ok(())
        }
        Command::Provision { .. } => provision(&config).await,
    }
}

async fn serve(
    cli: &CliConfig,
    config: &WorkerConfig,
    test_input: Option<&str>,
    skip_wait: bool,
) -> sd_worker::Result<()> {
    let handler = Arc::new(JobHandler::new(
        config,
        LocalModelStorage::new(&config.paths),
    )?);

    if !skip_wait {
        ReadinessProbe::new(&config.readiness)
            .wait_for_service(&config.readiness_url())
            .await?;
        if config.webui.refresh_on_start {
            handler.webui().refresh_checkpoints().await?;
        }
    }

    // 本機測試：明確指定，或工作目錄中存在 test_input.json
    let test_input = test_input
        .map(PathBuf::from)
        .or_else(|| Some(PathBuf::from(DEFAULT_TEST_INPUT)).filter(|p| p.is_file()));
    if let Some(path) = test_input {
        tracing::info!("🧪 Running local test input {}", path.display());
        let event = read_event(&path)?;
        let output = run_local(handler.as_ref(), &event, &JobMonitor::new(cli.monitor)).await;
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    tracing::info!("WebUI API Service is ready. Starting job worker...");
    let worker = QueueWorker::new(handler, &config.queue, JobMonitor::new(cli.monitor))?;
    worker
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}

async fn run_job(
    cli: &CliConfig,
    config: &WorkerConfig,
    input: &Path,
    output_dir: Option<&str>,
) -> sd_worker::Result<()> {
    let handler = JobHandler::new(config, LocalModelStorage::new(&config.paths))?;
    let event = read_event(input)?;
    let output = run_local(&handler, &event, &JobMonitor::new(cli.monitor)).await;

    if let Some(error) = output.get("error").and_then(Value::as_str) {
        return Err(WorkerError::ProcessError {
            command: format!("run-job {}", input.display()),
            message: error.to_string(),
        });
    }

    let body = output.get("output").cloned().unwrap_or(Value::Null);
    match output_dir {
        Some(dir) => {
            let saved = save_images(&body, Path::new(dir))?;
            for path in &saved {
                println!("📁 {}", path.display());
            }
            if saved.is_empty() {
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
        }
        None => println!("{}", serde_json::to_string_pretty(&body)?),
    }
    Ok(())
}

async fn provision(config: &WorkerConfig) -> sd_worker::Result<()> {
    let storage = Arc::new(LocalModelStorage::new(&config.paths));
    let provisioner = Provisioner::new(storage, Downloader::new(config.http.download_timeout())?);

    let report = provisioner
        .run(
            Path::new(&config.provision.models_list),
            Path::new(&config.provision.extensions_list),
        )
        .await?;

    println!(
        "📦 {} installed, {} skipped, {} failed",
        report.installed.len(),
        report.skipped.len(),
        report.failed.len()
    );
    if report.has_failures() {
        return Err(WorkerError::ProcessError {
            command: "provision".to_string(),
            message: format!("failed entries: {}", report.failed.join(", ")),
        });
    }
    Ok(())
}

fn read_event(path: &Path) -> sd_worker::Result<Value> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// 將 `images` / `image` 中的 base64 圖片解碼為 PNG 檔
fn save_images(output: &Value, dir: &Path) -> sd_worker::Result<Vec<PathBuf>> {
    let images: Vec<&str> = match (output.get("images"), output.get("image")) {
        (Some(Value::Array(items)), _) => items.iter().filter_map(Value::as_str).collect(),
        (_, Some(Value::String(image))) => vec![image.as_str()],
        _ => Vec::new(),
    };

    std::fs::create_dir_all(dir)?;
    let mut saved = Vec::new();
    for (index, image) in images.into_iter().enumerate() {
        // 去除 data URL 前綴
        let encoded = image.split_once(',').map(|(_, data)| data).unwrap_or(image);
        let bytes = general_purpose::STANDARD.decode(encoded).map_err(|e| {
            WorkerError::invalid_input(format!("Image {} is not valid base64: {}", index, e))
        })?;
        let path = dir.join(format!("image_{:03}.png", index));
        std::fs::write(&path, bytes)?;
        saved.push(path);
    }
    Ok(saved)
}
