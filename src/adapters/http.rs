use crate::utils::error::{Result, WorkerError};
use reqwest::{Client, Method, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;

/// 重試策略：狀態碼重試只套用在冪等方法，連線失敗則一律重試
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub total: u32,
    pub backoff_factor: f64,
    pub backoff_max: Duration,
    pub status_forcelist: Vec<u16>,
    pub respect_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            total: 10,
            backoff_factor: 0.1,
            backoff_max: Duration::from_secs(120),
            status_forcelist: vec![502, 503, 504],
            respect_retry_after: true,
        }
    }
}

impl RetryPolicy {
    /// 第 n 次重試前的等待時間：第一次不等待，之後為 factor * 2^(n-1)
    pub fn backoff(&self, retry_number: u32) -> Duration {
        if retry_number <= 1 || self.backoff_factor <= 0.0 {
            return Duration::ZERO;
        }
        let exponent = (retry_number - 1).min(62) as i32;
        let secs = self.backoff_factor * 2f64.powi(exponent);
        Duration::from_secs_f64(secs.min(self.backoff_max.as_secs_f64()))
    }

    pub fn is_idempotent(method: &Method) -> bool {
        matches!(
            *method,
            Method::GET | Method::HEAD | Method::PUT | Method::DELETE | Method::OPTIONS | Method::TRACE
        )
    }

    pub fn should_retry_status(&self, method: &Method, status: StatusCode) -> bool {
        Self::is_idempotent(method) && self.status_forcelist.contains(&status.as_u16())
    }

    pub fn should_retry_error(&self, method: &Method, error: &reqwest::Error) -> bool {
        if error.is_connect() {
            return true;
        }
        Self::is_idempotent(method) && (error.is_timeout() || error.is_request())
    }

    fn retry_after(&self, response: &Response) -> Option<Duration> {
        if !self.respect_retry_after || response.status() != StatusCode::SERVICE_UNAVAILABLE {
            return None;
        }
        response
            .headers()
            .get(reqwest::header::RETRY_AFTER)?
            .to_str()
            .ok()?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }
}

/// 具重試能力的 HTTP session，所有 WebUI 呼叫共用
#[derive(Debug, Clone)]
pub struct RetryingClient {
    client: Client,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("sd-worker/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, policy })
    }

    pub async fn get(&self, url: &str, timeout: Duration) -> Result<Response> {
        self.send::<()>(Method::GET, url, None, timeout).await
    }

    pub async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: Option<&B>,
        timeout: Duration,
    ) -> Result<Response> {
        self.send(Method::POST, url, body, timeout).await
    }

    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
        timeout: Duration,
    ) -> Result<Response> {
        let mut retries = 0u32;

        loop {
            let mut request = self.client.request(method.clone(), url).timeout(timeout);
            if let Some(body) = body {
                request = request.json(body);
            }

            let (delay, reason) = match request.send().await {
                Ok(response) => {
                    if !self.policy.should_retry_status(&method, response.status()) {
                        return Ok(response);
                    }
                    let reason = format!("too many {} error responses", response.status().as_u16());
                    if retries >= self.policy.total {
                        return Err(WorkerError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: retries + 1,
                            reason,
                        });
                    }
                    let delay = self
                        .policy
                        .retry_after(&response)
                        .unwrap_or_else(|| self.policy.backoff(retries + 1));
                    (delay, reason)
                }
                Err(e) => {
                    if !self.policy.should_retry_error(&method, &e) {
                        return Err(WorkerError::HttpError(e));
                    }
                    if retries >= self.policy.total {
                        return Err(WorkerError::RetriesExhausted {
                            url: url.to_string(),
                            attempts: retries + 1,
                            reason: e.to_string(),
                        });
                    }
                    (self.policy.backoff(retries + 1), e.to_string())
                }
            };

            retries += 1;
            tracing::debug!(
                "🔁 {} {} retry {}/{} in {:?}: {}",
                method,
                url,
                retries,
                self.policy.total,
                delay,
                reason
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// 讀取 200 回應的 JSON；其他狀態碼轉為 `Upstream` 錯誤
pub async fn expect_json(response: Response, context: &str) -> Result<serde_json::Value> {
    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(WorkerError::Upstream {
            context: context.to_string(),
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::ZERO);
        assert_eq!(policy.backoff(2), Duration::from_secs_f64(0.2));
        assert_eq!(policy.backoff(3), Duration::from_secs_f64(0.4));
        assert_eq!(policy.backoff(10), Duration::from_secs_f64(51.2));
        assert_eq!(policy.backoff(20), Duration::from_secs(120));
    }

    #[test]
    fn test_status_retry_only_for_idempotent_methods() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry_status(&Method::GET, StatusCode::BAD_GATEWAY));
        assert!(policy.should_retry_status(&Method::GET, StatusCode::SERVICE_UNAVAILABLE));
        assert!(!policy.should_retry_status(&Method::GET, StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!policy.should_retry_status(&Method::POST, StatusCode::SERVICE_UNAVAILABLE));
    }
}
