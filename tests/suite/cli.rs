//! Runs the `stepchain` binary against a mock pool server.

use std::path::PathBuf;
use std::process::{Command, Output};

use tempfile::TempDir;
use wiremock::MockServer;

use crate::common::{
    PXE_CONFIGS_PATH, mount_devices, mount_models, mount_script, mount_status, write_config,
};

async fn run_binary(args: Vec<String>) -> Output {
    tokio::task::spawn_blocking(move || {
        Command::new(env!("CARGO_BIN_EXE_stepchain"))
            .args(args)
            .env("RUST_LOG", "warn")
            .output()
            .unwrap()
    })
    .await
    .unwrap()
}

fn config_args(path: PathBuf) -> Vec<String> {
    vec!["--config".to_string(), path.display().to_string()]
}

#[tokio::test]
async fn successful_bootstrap_exits_zero() {
    let server = MockServer::start().await;
    mount_script(&server, "/ui/js/models.js", "var Devices;").await;
    mount_models(&server).await;
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, &server, r#"[["js/models.js"]]"#);

    let output = run_binary(config_args(path)).await;

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("2 devices, 3 pxe configs"),
        "stdout: {stdout}"
    );
}

#[tokio::test]
async fn stalled_bootstrap_prints_error_log_and_fails() {
    let server = MockServer::start().await;
    mount_devices(&server).await;
    mount_status(&server, PXE_CONFIGS_PATH, 500).await;
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, &server, "[]");

    let output = run_binary(config_args(path)).await;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("AJAX Error while fetching pxe_configs: Internal Server Error"),
        "stderr: {stderr}"
    );
}

#[tokio::test]
async fn unreadable_config_fails() {
    let dir = TempDir::new().unwrap();
    let output = run_binary(config_args(dir.path().join("missing.toml"))).await;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("loading config from"), "stderr: {stderr}");
}
