use crate::config::toml_config::QueueConfig;
use crate::domain::model::Job;
use crate::domain::ports::JobExecutor;
use crate::utils::error::{Result, WorkerError};
use crate::utils::monitor::JobMonitor;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// 佇列回傳的單一項目
#[derive(Debug, Clone)]
pub enum QueueEntry {
    Job(Job),
    /// 無法解析成 job，也就沒有可回報的 id
    Invalid { reason: String },
}

impl QueueEntry {
    pub fn parse(value: Value) -> Self {
        match serde_json::from_value::<Job>(value) {
            Ok(job) => QueueEntry::Job(job),
            Err(e) => QueueEntry::Invalid {
                reason: e.to_string(),
            },
        }
    }
}

/// 一輪輪詢的結果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub received: usize,
    pub posted: usize,
    pub failed_posts: usize,
    pub dropped: usize,
}

/// 從 job 佇列拉取工作、執行並回報結果；一次只處理一個 job
pub struct QueueWorker<E: JobExecutor> {
    executor: Arc<E>,
    client: Client,
    job_take_url: String,
    job_done_url: String,
    api_key: Option<String>,
    worker_id: String,
    idle_poll: Duration,
    monitor: JobMonitor,
}

impl<E: JobExecutor> QueueWorker<E> {
    pub fn new(executor: Arc<E>, config: &QueueConfig, monitor: JobMonitor) -> Result<Self> {
        let job_take_url = config
            .job_take_url
            .clone()
            .ok_or_else(|| WorkerError::MissingConfigError {
                field: "queue.job_take_url".to_string(),
            })?;
        let job_done_url = config
            .job_done_url
            .clone()
            .ok_or_else(|| WorkerError::MissingConfigError {
                field: "queue.job_done_url".to_string(),
            })?;
        let worker_id = config
            .worker_id
            .clone()
            .unwrap_or_else(|| format!("worker_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S")));

        Ok(Self {
            executor,
            client: Client::new(),
            job_take_url,
            job_done_url,
            api_key: config.api_key.clone(),
            worker_id,
            idle_poll: Duration::from_millis(config.idle_poll_ms),
            monitor,
        })
    }

    /// 取得下一批 job；204 或空回應代表目前沒有工作。
    /// 每個項目各自解析，格式錯誤的項目不影響同批的其他 job
    pub async fn fetch_jobs(&self) -> Result<Vec<QueueEntry>> {
        let url = self.job_take_url.replace("$ID", &self.worker_id);
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header(reqwest::header::AUTHORIZATION, key);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::Upstream {
                context: "Failed to fetch job".to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let entries = match serde_json::from_str::<Value>(&body)? {
            Value::Array(items) => items,
            other => vec![other],
        };
        Ok(entries.into_iter().map(QueueEntry::parse).collect())
    }

    pub async fn process(&self, job: &Job) -> Value {
        execute_job(self.executor.as_ref(), job, &self.monitor).await
    }

    pub async fn post_result(&self, job_id: &str, body: &Value) -> Result<()> {
        let url = self.job_done_url.replace("$ID", job_id);
        let mut request = self
            .client
            .post(&url)
            .query(&[("isStream", "false")])
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.header(reqwest::header::AUTHORIZATION, key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(WorkerError::Upstream {
                context: format!("Failed to post result for job {}", job_id),
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(())
    }

    /// 拉取並處理一輪 job；單一結果回報失敗時繼續處理同批的其餘 job
    pub async fn run_once(&self) -> Result<BatchReport> {
        let entries = self.fetch_jobs().await?;
        let mut report = BatchReport {
            received: entries.len(),
            ..BatchReport::default()
        };

        for entry in entries {
            let job = match entry {
                QueueEntry::Job(job) => job,
                QueueEntry::Invalid { reason } => {
                    tracing::error!("❌ Dropping malformed job without id: {}", reason);
                    report.dropped += 1;
                    continue;
                }
            };
            let Some(job_id) = job.id.clone().filter(|id| !id.is_empty()) else {
                tracing::error!("❌ Dropping job without id");
                report.dropped += 1;
                continue;
            };

            tracing::info!("📨 Received job {}", job_id);
            let body = self.process(&job).await;
            match self.post_result(&job_id, &body).await {
                Ok(()) => report.posted += 1,
                Err(e) => {
                    tracing::error!("❌ Could not report job {}: {}", job_id, e);
                    report.failed_posts += 1;
                }
            }
        }

        if report.failed_posts > 0 || report.dropped > 0 {
            tracing::warn!(
                "⚠️ Batch of {}: {} reported, {} report failures, {} dropped",
                report.received,
                report.posted,
                report.failed_posts,
                report.dropped
            );
        }
        Ok(report)
    }

    /// 持續輪詢直到 shutdown 完成；shutdown 只在兩個 job 之間生效
    pub async fn run_until<F: Future<Output = ()>>(&self, shutdown: F) -> Result<()> {
        tokio::pin!(shutdown);
        tracing::info!("🚀 Worker {} polling for jobs", self.worker_id);

        loop {
            let processed = match self.run_once().await {
                Ok(report) => report.received,
                Err(e) => {
                    tracing::warn!("⚠️ Queue poll failed: {}", e);
                    0
                }
            };

            let pause = if processed > 0 {
                Duration::ZERO
            } else {
                self.idle_poll
            };

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("🛑 Shutdown requested, worker {} stopping", self.worker_id);
                    return Ok(());
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}

/// 執行單一 job，錯誤轉成 `{"error": ...}`
pub async fn execute_job<E: JobExecutor + ?Sized>(
    executor: &E,
    job: &Job,
    monitor: &JobMonitor,
) -> Value {
    let job_id = job.id.as_deref().unwrap_or("local_test");
    let timer = monitor.start();

    let result = match &job.input {
        Some(input) if input.is_object() => executor.execute(input).await,
        _ => Err(WorkerError::invalid_input(
            "Job event must contain an 'input' object",
        )),
    };

    monitor.finish(job_id, timer, result.is_ok());
    match result {
        Ok(output) => json!({ "output": output }),
        Err(e) => {
            tracing::error!(
                "❌ Job {} failed: {} (Category: {:?}, Severity: {:?})",
                job_id,
                e,
                e.category(),
                e.severity()
            );
            tracing::debug!("💡 {}", e.recovery_suggestion());
            json!({ "error": e.to_string() })
        }
    }
}

/// 本機測試模式：處理一次 test input 後結束
pub async fn run_local<E: JobExecutor + ?Sized>(
    executor: &E,
    event: &Value,
    monitor: &JobMonitor,
) -> Value {
    match serde_json::from_value::<Job>(event.clone()) {
        Ok(job) => execute_job(executor, &job, monitor).await,
        Err(e) => json!({ "error": format!("Invalid test input: {}", e) }),
    }
}
