mod common;

use common::{test_config, test_handler, write_model};
use httpmock::prelude::*;
use sd_worker::core::download::Downloader;
use sd_worker::core::provision::Provisioner;
use sd_worker::LocalModelStorage;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn provisioner(root: &TempDir) -> Provisioner<LocalModelStorage> {
    let config = test_config("http://127.0.0.1:1", root.path());
    Provisioner::new(
        Arc::new(LocalModelStorage::new(&config.paths)),
        Downloader::new(Duration::from_secs(5)).unwrap(),
    )
}

#[tokio::test]
async fn test_install_models_downloads_then_skips_existing() {
    let server = MockServer::start_async().await;
    let root = TempDir::new().unwrap();
    let file = server
        .mock_async(|when, then| {
            when.method(GET).path("/files/add_detail.safetensors");
            then.status(200).body("lora-bytes");
        })
        .await;

    let list = root.path().join("models.txt");
    std::fs::write(
        &list,
        format!(
            "# weights\nlora|{}?download=true\nhypernetwork {}\nbroken-line\n",
            server.url("/files/add_detail.safetensors"),
            server.url("/files/x.pt")
        ),
    )
    .unwrap();

    let provisioner = provisioner(&root);
    let report = provisioner.install_models(&list).await.unwrap();

    let target = root.path().join("models/Lora/add_detail.safetensors");
    assert_eq!(report.installed, vec![target.display().to_string()]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.failed, vec!["broken-line".to_string()]);
    assert_eq!(std::fs::read(&target).unwrap(), b"lora-bytes");

    let second = provisioner.install_models(&list).await.unwrap();
    assert!(second.installed.is_empty());
    assert_eq!(second.skipped[0], target.display().to_string());
    file.assert_hits_async(1).await;
}

#[tokio::test]
async fn test_install_models_records_failed_downloads() {
    let server = MockServer::start_async().await;
    let root = TempDir::new().unwrap();
    server
        .mock_async(|when, then| {
            when.method(GET).path("/files/gone.ckpt");
            then.status(404);
        })
        .await;

    let list = root.path().join("models.txt");
    let url = server.url("/files/gone.ckpt");
    std::fs::write(&list, format!("checkpoint|{}\n", url)).unwrap();

    let report = provisioner(&root).install_models(&list).await.unwrap();
    assert_eq!(report.failed, vec![url]);
    assert!(report.has_failures());
    assert!(!root.path().join("models/Stable-diffusion/gone.ckpt").exists());
}

#[tokio::test]
async fn test_missing_list_is_skipped() {
    let root = TempDir::new().unwrap();
    let report = provisioner(&root)
        .install_models(&root.path().join("absent.txt"))
        .await
        .unwrap();
    assert_eq!(report, Default::default());
}

#[tokio::test]
async fn test_install_extensions_skips_existing_and_reports_clone_failures() {
    let root = TempDir::new().unwrap();
    std::fs::create_dir_all(root.path().join("extensions/sd-webui-controlnet")).unwrap();

    let list = root.path().join("extensions.txt");
    std::fs::write(
        &list,
        "https://github.com/Mikubill/sd-webui-controlnet.git\nhttps://github.com/Gourieff/sd-webui-reactor\n",
    )
    .unwrap();

    let report = provisioner(&root)
        .with_git_binary("sd-worker-missing-git")
        .install_extensions(&list)
        .await
        .unwrap();

    assert_eq!(report.skipped, vec!["sd-webui-controlnet".to_string()]);
    assert_eq!(report.failed, vec!["sd-webui-reactor".to_string()]);
    assert!(report.installed.is_empty());
}

#[tokio::test]
async fn test_install_models_action_uses_list_path() {
    let server = MockServer::start_async().await;
    let root = TempDir::new().unwrap();
    write_model(&root.path().join("models/VAE"), "vae.pt", b"v");

    let list = root.path().join("custom.txt");
    std::fs::write(&list, format!("vae {}\n", server.url("/files/vae.pt"))).unwrap();

    let handler = test_handler(&server, root.path());
    let output = handler
        .handle(&json!({"action": "install_models", "list_path": list.display().to_string()}))
        .await
        .unwrap();

    assert_eq!(output["installed"], json!([]));
    assert_eq!(output["skipped"].as_array().unwrap().len(), 1);
    assert_eq!(output["failed"], json!([]));
}
