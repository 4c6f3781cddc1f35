#[cfg(feature = "lambda")]
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
#[cfg(feature = "lambda")]
use sd_worker::core::readiness::ReadinessProbe;
#[cfg(feature = "lambda")]
use sd_worker::utils::logger::{self, LogFormat};
#[cfg(feature = "lambda")]
use sd_worker::utils::validation::Validate;
#[cfg(feature = "lambda")]
use sd_worker::{JobHandler, LambdaConfig, LocalModelStorage};
#[cfg(feature = "lambda")]
use serde_json::Value;
#[cfg(feature = "lambda")]
use std::sync::Arc;

#[cfg(feature = "lambda")]
async fn function_handler(
    handler: Arc<JobHandler<LocalModelStorage>>,
    event: LambdaEvent<Value>,
) -> Result<Value, Error> {
    tracing::info!("📨 Lambda job {}", event.context.request_id);

    // 與佇列 worker 相同的封包：{"input": {...}}
    let output = handler
        .handle_event(&event.payload)
        .await
        .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)?;

    Ok(output)
}

#[cfg(feature = "lambda")]
#[tokio::main]
async fn main() -> Result<(), Error> {
    logger::init_logger(LogFormat::Json, false);

    let config = LambdaConfig::from_env()?;
    config.validate()?;

    let handler = Arc::new(JobHandler::new(
        &config.worker,
        LocalModelStorage::new(&config.worker.paths),
    )?);

    if config.wait_for_service {
        ReadinessProbe::new(&config.worker.readiness)
            .wait_for_service(&config.worker.readiness_url())
            .await?;
        handler.webui().refresh_checkpoints().await?;
    }

    run(service_fn(move |event: LambdaEvent<Value>| {
        let handler = Arc::clone(&handler);
        async move { function_handler(handler, event).await }
    }))
    .await
}
