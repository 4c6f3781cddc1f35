use crate::domain::model::{ModelFileInfo, ModelType};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// 模型檔案所在的檔案系統
pub trait ModelStorage: Send + Sync {
    fn model_dir(&self, model_type: ModelType) -> &Path;

    fn extensions_dir(&self) -> &Path;

    /// 列出目錄中符合副檔名的檔案；目錄不存在時回傳空清單
    fn list_files(
        &self,
        dir: &Path,
        extensions: &[&str],
    ) -> impl std::future::Future<Output = Result<Vec<ModelFileInfo>>> + Send;

    fn remove_file(&self, path: &Path) -> impl std::future::Future<Output = Result<()>> + Send;

    fn rename_file(
        &self,
        from: &Path,
        to: &Path,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// 路徑實際指向的檔案是否位於任何一個已設定的模型目錄之下；
    /// 兩邊都先解開 symlink 與 `..`，不存在的路徑一律不算
    fn is_managed_path(&self, path: &Path) -> impl std::future::Future<Output = bool> + Send {
        async move {
            let Ok(target) = tokio::fs::canonicalize(path).await else {
                return false;
            };
            for model_type in ModelType::ALL {
                if let Ok(dir) = tokio::fs::canonicalize(self.model_dir(model_type)).await {
                    if target.starts_with(&dir) {
                        return true;
                    }
                }
            }
            false
        }
    }

    fn resolve(&self, model_type: ModelType, file_name: &str) -> PathBuf {
        self.model_dir(model_type).join(file_name)
    }
}

/// 處理單一 job input 並產生輸出
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, input: &Value) -> Result<Value>;
}
