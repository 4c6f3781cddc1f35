use crate::config::toml_config::ReadinessConfig;
use crate::utils::error::{Result, WorkerError};
use reqwest::Client;
use std::time::{Duration, Instant};

/// 輪詢 WebUI 直到它開始回應 HTTP
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    client: Client,
    poll_interval: Duration,
    request_timeout: Duration,
    log_every: u32,
    max_wait: Option<Duration>,
}

impl ReadinessProbe {
    pub fn new(config: &ReadinessConfig) -> Self {
        Self {
            client: Client::new(),
            poll_interval: config.poll_interval(),
            request_timeout: config.request_timeout(),
            log_every: config.log_every.max(1),
            max_wait: config.max_wait(),
        }
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// 任何 HTTP 回應（不論狀態碼）都代表服務已就緒，回傳失敗次數
    pub async fn wait_for_service(&self, url: &str) -> Result<u32> {
        let started = Instant::now();
        let mut failures = 0u32;

        loop {
            match self
                .client
                .get(url)
                .timeout(self.request_timeout)
                .send()
                .await
            {
                Ok(response) => {
                    tracing::info!(
                        "✅ Service at {} answered {} after {} failed attempts",
                        url,
                        response.status(),
                        failures
                    );
                    return Ok(failures);
                }
                Err(e) => {
                    failures += 1;
                    if failures % self.log_every == 0 {
                        tracing::info!("⏳ Service not ready yet. Retrying...");
                        tracing::debug!("Last readiness error: {}", e);
                    }
                }
            }

            if let Some(max_wait) = self.max_wait {
                if started.elapsed() >= max_wait {
                    return Err(WorkerError::ServiceUnavailable {
                        url: url.to_string(),
                        waited_secs: started.elapsed().as_secs(),
                    });
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
