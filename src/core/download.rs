use crate::utils::error::{Result, WorkerError};
use reqwest::{header, Client, Response, StatusCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use url::Url;

/// 串流下載大型權重檔；逾時只限制連線與兩次讀取之間的間隔
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("sd-worker/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// 發出 GET 並確認狀態碼為 200
    pub async fn open(&self, url: &str, bearer_token: Option<&str>) -> Result<Response> {
        let mut request = self.client.get(url);
        if let Some(token) = bearer_token {
            request = request.bearer_auth(token);
        }

        tracing::debug!("📥 Requesting {}", url);
        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(WorkerError::Upstream {
                context: "Failed to download model".to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// 先寫入 `<name>.part`，完成後再改名，避免留下不完整的檔案
    pub async fn save(&self, mut response: Response, target: &Path) -> Result<u64> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(target);
        let written = match write_body(&mut response, &partial).await {
            Ok(written) => written,
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        tokio::fs::rename(&partial, target).await?;
        tracing::info!("💾 Saved {} ({} bytes)", target.display(), written);
        Ok(written)
    }

    pub async fn fetch_to(&self, url: &str, target: &Path) -> Result<u64> {
        let response = self.open(url, None).await?;
        self.save(response, target).await
    }
}

async fn write_body(response: &mut Response, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    target.with_file_name(name)
}

/// 從 `Content-Disposition` 取出 `filename=` 的值
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    let (_, rest) = value.split_once("filename=")?;
    let raw = rest.split(';').next().unwrap_or_default();
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == ';').trim();
    // 只保留檔名部分
    let name = trimmed.rsplit(['/', '\\']).next().unwrap_or_default();
    (!name.is_empty() && name != "." && name != "..").then(|| name.to_string())
}

pub fn filename_from_response(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(filename_from_content_disposition)
}

/// URL 路徑的最後一段（去除查詢字串）
pub fn filename_from_url(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    // query 與 fragment 不在 path 內，`..` 已在解析時正規化
    url.path_segments()?
        .rev()
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_content_disposition() {
        assert_eq!(
            filename_from_content_disposition(r#"attachment; filename="dreamshaper_8.safetensors""#),
            Some("dreamshaper_8.safetensors".to_string())
        );
        assert_eq!(
            filename_from_content_disposition(
                r#"attachment; filename="a.pt"; filename*=UTF-8''a.pt"#
            ),
            Some("a.pt".to_string())
        );
        assert_eq!(
            filename_from_content_disposition(r#"attachment; filename="../../x.ckpt""#),
            Some("x.ckpt".to_string())
        );
        assert_eq!(filename_from_content_disposition("inline"), None);
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://huggingface.co/r/resolve/main/v1-5.safetensors?download=true"),
            Some("v1-5.safetensors".to_string())
        );
        assert_eq!(
            filename_from_url("https://civitai.com/api/download/models/12345"),
            Some("12345".to_string())
        );
        assert_eq!(filename_from_url("https://example.com"), None);
        assert_eq!(filename_from_url("https://example.com/"), None);
        assert_eq!(
            filename_from_url("https://example.com/loras/detail/#v2"),
            Some("detail".to_string())
        );
        assert_eq!(
            filename_from_url("https://example.com/a/../b.pt?x=/y.ckpt"),
            Some("b.pt".to_string())
        );
        assert_eq!(filename_from_url("not a url/file.ckpt"), None);
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/m/a.safetensors")),
            PathBuf::from("/m/a.safetensors.part")
        );
    }
}
