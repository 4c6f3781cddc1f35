//! 啟動前的安裝程序：依 `models.txt` 下載權重檔、依 `extensions.txt` clone 擴充套件。

use crate::core::download::{filename_from_url, Downloader};
use crate::domain::model::{ModelType, ProvisionReport};
use crate::domain::ports::ModelStorage;
use crate::utils::error::{Result, WorkerError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    pub model_type: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionEntry {
    pub name: String,
    pub url: String,
}

fn content_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
}

/// 支援 `type|url` 與 `type url` 兩種格式；無法解析的行回傳 Err(原始行)
pub fn parse_model_list(content: &str) -> Vec<std::result::Result<ModelEntry, String>> {
    content_lines(content)
        .map(|line| {
            if let Some((model_type, url)) = line.split_once('|') {
                let (model_type, url) = (model_type.trim(), url.trim());
                if model_type.is_empty() || url.is_empty() {
                    return Err(line.to_string());
                }
                return Ok(ModelEntry {
                    model_type: model_type.to_string(),
                    url: url.to_string(),
                });
            }

            let parts: Vec<&str> = line.split_whitespace().collect();
            match parts.as_slice() {
                [model_type, url] => Ok(ModelEntry {
                    model_type: model_type.to_string(),
                    url: url.to_string(),
                }),
                _ => Err(line.to_string()),
            }
        })
        .collect()
}

/// 每行一個 repository 網址，可加上 `name|` 前綴
pub fn parse_extension_list(content: &str) -> Vec<ExtensionEntry> {
    content_lines(content)
        .filter_map(|line| {
            let url = line
                .split_once('|')
                .map(|(_, url)| url.trim())
                .unwrap_or(line);
            let name = repository_name(url)?;
            Some(ExtensionEntry {
                name,
                url: url.to_string(),
            })
        })
        .collect()
}

pub fn repository_name(url: &str) -> Option<String> {
    let last = url.trim_end_matches('/').rsplit('/').next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    (!name.is_empty() && name != "." && name != "..").then(|| name.to_string())
}

pub struct Provisioner<S: ModelStorage> {
    storage: Arc<S>,
    downloader: Downloader,
    git_binary: String,
}

impl<S: ModelStorage> Provisioner<S> {
    pub fn new(storage: Arc<S>, downloader: Downloader) -> Self {
        Self {
            storage,
            downloader,
            git_binary: "git".to_string(),
        }
    }

    pub fn with_git_binary(mut self, git_binary: impl Into<String>) -> Self {
        self.git_binary = git_binary.into();
        self
    }

    async fn read_list(path: &Path) -> Result<Option<String>> {
        if !tokio::fs::try_exists(path).await? {
            tracing::warn!("⚠️ {} does not exist. Skipping...", path.display());
            return Ok(None);
        }
        Ok(Some(tokio::fs::read_to_string(path).await?))
    }

    pub async fn install_models(&self, list_path: &Path) -> Result<ProvisionReport> {
        let mut report = ProvisionReport::default();
        let Some(content) = Self::read_list(list_path).await? else {
            return Ok(report);
        };

        let entries = parse_model_list(&content);
        if entries.is_empty() {
            tracing::info!("No entries in {}. Skipping...", list_path.display());
            return Ok(report);
        }

        tracing::info!("🔽 Downloading models from {}", list_path.display());
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(line) => {
                    tracing::warn!("⚠️ Invalid line in {}: {}", list_path.display(), line);
                    report.failed.push(line);
                    continue;
                }
            };

            let model_type: ModelType = match entry.model_type.parse() {
                Ok(model_type) => model_type,
                Err(_) => {
                    tracing::warn!("⚠️ Unknown model type: {}", entry.model_type);
                    report.skipped.push(entry.url);
                    continue;
                }
            };

            let Some(filename) = filename_from_url(&entry.url) else {
                tracing::warn!("⚠️ Cannot derive a file name from {}", entry.url);
                report.failed.push(entry.url);
                continue;
            };

            let target = self.storage.resolve(model_type, &filename);
            if tokio::fs::try_exists(&target).await? {
                tracing::info!("Already exists: {}", target.display());
                report.skipped.push(target.display().to_string());
                continue;
            }

            tracing::info!("Downloading {} to {}", filename, target.display());
            match self.downloader.fetch_to(&entry.url, &target).await {
                Ok(_) => report.installed.push(target.display().to_string()),
                Err(e) => {
                    tracing::error!("❌ Download failed: {} | {}", entry.url, e);
                    report.failed.push(entry.url);
                }
            }
        }

        log_report("models", &report);
        Ok(report)
    }

    pub async fn install_extensions(&self, list_path: &Path) -> Result<ProvisionReport> {
        let mut report = ProvisionReport::default();
        let Some(content) = Self::read_list(list_path).await? else {
            return Ok(report);
        };

        let entries = parse_extension_list(&content);
        if entries.is_empty() {
            tracing::info!("No entries in {}. Skipping...", list_path.display());
            return Ok(report);
        }

        let extensions_dir = self.storage.extensions_dir();
        tokio::fs::create_dir_all(extensions_dir).await?;

        tracing::info!("🔽 Installing extensions from {}", list_path.display());
        for entry in entries {
            let dest = extensions_dir.join(&entry.name);
            if tokio::fs::try_exists(&dest).await? {
                tracing::info!("Already exists: {}", dest.display());
                report.skipped.push(entry.name);
                continue;
            }

            match self.clone_repository(&entry.url, &dest).await {
                Ok(()) => {
                    tracing::info!("✅ Cloned: {}", entry.name);
                    report.installed.push(entry.name);
                }
                Err(e) => {
                    tracing::error!("❌ {}", e);
                    report.failed.push(entry.name);
                }
            }
        }

        log_report("extensions", &report);
        Ok(report)
    }

    /// `git clone --depth=1 <url> <dest>`
    pub async fn clone_repository(&self, url: &str, dest: &Path) -> Result<()> {
        let output = Command::new(&self.git_binary)
            .arg("clone")
            .arg("--depth=1")
            .arg(url)
            .arg(dest)
            .output()
            .await
            .map_err(|e| WorkerError::ProcessError {
                command: format!("{} clone {}", self.git_binary, url),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(WorkerError::ProcessError {
                command: format!("{} clone {}", self.git_binary, url),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    /// 依設定的兩份清單依序安裝
    pub async fn run(&self, models_list: &Path, extensions_list: &Path) -> Result<ProvisionReport> {
        let mut report = self.install_models(models_list).await?;
        report.merge(self.install_extensions(extensions_list).await?);
        Ok(report)
    }

    pub fn default_list_path(path: Option<&str>, fallback: &str) -> PathBuf {
        PathBuf::from(path.filter(|p| !p.is_empty()).unwrap_or(fallback))
    }
}

fn log_report(kind: &str, report: &ProvisionReport) {
    tracing::info!(
        "📦 {}: {} installed, {} skipped, {} failed",
        kind,
        report.installed.len(),
        report.skipped.len(),
        report.failed.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_model_list_formats() {
        let content = "\
# comment
checkpoint|https://hf.co/a/resolve/main/sd15.safetensors?download=true

lora https://civitai.com/api/download/models/1
vae
too many fields here
";
        let entries = parse_model_list(content);
        assert_eq!(entries.len(), 4);
        assert_eq!(
            entries[0],
            Ok(ModelEntry {
                model_type: "checkpoint".to_string(),
                url: "https://hf.co/a/resolve/main/sd15.safetensors?download=true".to_string(),
            })
        );
        assert_eq!(entries[1].as_ref().unwrap().model_type, "lora");
        assert_eq!(entries[2], Err("vae".to_string()));
        assert!(entries[3].is_err());
    }

    #[test]
    fn test_parse_extension_list() {
        let content = "\
https://github.com/Gourieff/sd-webui-reactor
# disabled
controlnet|https://github.com/Mikubill/sd-webui-controlnet.git
https://github.com/x/adetailer/
";
        let entries = parse_extension_list(content);
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["sd-webui-reactor", "sd-webui-controlnet", "adetailer"]);
        assert_eq!(
            entries[1].url,
            "https://github.com/Mikubill/sd-webui-controlnet.git"
        );
    }

    #[test]
    fn test_repository_name_rejects_empty() {
        assert_eq!(repository_name("https://github.com/a/b.git"), Some("b".to_string()));
        assert_eq!(repository_name(""), None);
    }
}
