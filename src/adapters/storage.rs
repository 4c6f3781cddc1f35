use crate::config::toml_config::PathsConfig;
use crate::domain::model::{ModelFileInfo, ModelType};
use crate::domain::ports::ModelStorage;
use crate::utils::error::Result;
use crate::utils::validation::lowercase_extension;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// 本機檔案系統上的 WebUI 模型目錄
#[derive(Debug, Clone)]
pub struct LocalModelStorage {
    model_dirs: HashMap<ModelType, PathBuf>,
    extensions_dir: PathBuf,
}

impl LocalModelStorage {
    pub fn new(paths: &PathsConfig) -> Self {
        let model_dirs = ModelType::ALL
            .iter()
            .map(|model_type| (*model_type, paths.model_dir(*model_type)))
            .collect();

        Self {
            model_dirs,
            extensions_dir: paths.extensions_dir(),
        }
    }
}

impl ModelStorage for LocalModelStorage {
    fn model_dir(&self, model_type: ModelType) -> &Path {
        // new() 為每個 ModelType 都建立了目錄
        &self.model_dirs[&model_type]
    }

    fn extensions_dir(&self) -> &Path {
        &self.extensions_dir
    }

    async fn list_files(&self, dir: &Path, extensions: &[&str]) -> Result<Vec<ModelFileInfo>> {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !extensions.contains(&lowercase_extension(&name).as_str()) {
                continue;
            }

            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }

            let modified = metadata
                .modified()
                .ok()
                .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or_default();

            files.push(ModelFileInfo {
                name,
                size: metadata.len(),
                modified,
                path: entry.path().to_string_lossy().into_owned(),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn remove_file(&self, path: &Path) -> Result<()> {
        tokio::fs::remove_file(path).await?;
        Ok(())
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> Result<()> {
        tokio::fs::rename(from, to).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::VALID_EXTENSIONS;
    use tempfile::TempDir;

    #[test]
    fn test_list_files_filters_extensions_and_sorts() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalModelStorage::new(&PathsConfig::rooted_at(temp_dir.path()));
        let lora_dir = storage.model_dir(ModelType::Lora).to_path_buf();
        std::fs::create_dir_all(&lora_dir).unwrap();
        std::fs::write(lora_dir.join("b.safetensors"), b"bb").unwrap();
        std::fs::write(lora_dir.join("a.pt"), b"a").unwrap();
        std::fs::write(lora_dir.join("readme.md"), b"ignored").unwrap();

        let files = tokio_test::block_on(storage.list_files(&lora_dir, &VALID_EXTENSIONS)).unwrap();

        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.pt", "b.safetensors"]);
        assert_eq!(files[1].size, 2);
        assert!(files[1].modified > 0.0);
    }

    #[test]
    fn test_missing_directory_lists_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalModelStorage::new(&PathsConfig::rooted_at(temp_dir.path()));
        let files = tokio_test::block_on(
            storage.list_files(storage.model_dir(ModelType::Vae), &VALID_EXTENSIONS),
        )
        .unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_managed_paths() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let storage = LocalModelStorage::new(&PathsConfig::rooted_at(temp_dir.path()));
        let lora_dir = storage.model_dir(ModelType::Lora).to_path_buf();
        std::fs::create_dir_all(&lora_dir).unwrap();
        std::fs::write(lora_dir.join("x.safetensors"), b"x").unwrap();
        std::fs::write(temp_dir.path().join("root.ckpt"), b"r").unwrap();
        std::fs::write(outside.path().join("secret.ckpt"), b"s").unwrap();

        let managed = |path: PathBuf| tokio_test::block_on(storage.is_managed_path(&path));
        assert!(managed(lora_dir.join("x.safetensors")));
        assert!(managed(lora_dir.join("../Lora/x.safetensors")));
        assert!(!managed(lora_dir.join("missing.safetensors")));
        assert!(!managed(lora_dir.join("../../root.ckpt")));
        assert!(!managed(outside.path().join("secret.ckpt")));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_out_of_model_dir_is_not_managed() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let storage = LocalModelStorage::new(&PathsConfig::rooted_at(temp_dir.path()));
        let lora_dir = storage.model_dir(ModelType::Lora).to_path_buf();
        std::fs::create_dir_all(&lora_dir).unwrap();
        let secret = outside.path().join("secret.ckpt");
        std::fs::write(&secret, b"s").unwrap();
        let link = lora_dir.join("escape.safetensors");
        std::os::unix::fs::symlink(&secret, &link).unwrap();

        assert!(!tokio_test::block_on(storage.is_managed_path(&link)));
    }
}
