use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 本機終端機
    Compact,
    /// 無伺服器平台的日誌收集器，每個事件一行 JSON
    Json,
}

/// `RUST_LOG` 優先於預設過濾條件
pub fn init_logger(format: LogFormat, verbose: bool) {
    let default_directive = if verbose {
        "sd_worker=debug,info"
    } else {
        "sd_worker=info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);
    let registry = tracing_subscriber::registry().with(filter);

    // try_init: 同一行程重複初始化時保留第一個 subscriber
    let _ = match format {
        LogFormat::Compact => registry.with(layer.compact()).try_init(),
        LogFormat::Json => registry
            .with(layer.json().flatten_event(true).with_current_span(false))
            .try_init(),
    };
}
