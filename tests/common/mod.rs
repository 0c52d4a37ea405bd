//! Shared test utilities and fixtures
//!
//! A mock pool server serving page scripts and the admin JSON API.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use stepchain_config::{BootConfig, LoaderConfig, ModelsConfig, ServerConfig};
use stepchain_loader::ResourceLoader;
use stepchain_sequencer::ChainEnv;
use stepchain_types::{ErrorLog, ReportSink, ResourceId};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const DEVICES_PATH: &str = "/api/device/list/";
pub const PXE_CONFIGS_PATH: &str = "/api/bmm/pxe_config/list/";

/// Mount a script that must be fetched exactly once.
pub async fn mount_script(server: &MockServer, at: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "application/javascript"),
        )
        .expect(1)
        .mount(server)
        .await;
}

/// Mount a bare status response at `at`.
pub async fn mount_status(server: &MockServer, at: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Serve two devices at the devices endpoint.
pub async fn mount_devices(server: &MockServer) {
    let devices = serde_json::json!({"devices": [
        {"name": "dev1", "state": "offline", "fqdn": "dev1.example.com"},
        {"name": "dev2", "state": "running", "fqdn": "dev2.example.com"}
    ]});
    Mock::given(method("GET"))
        .and(path(DEVICES_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(devices))
        .mount(server)
        .await;
}

/// Serve three PXE configs at the PXE config endpoint.
pub async fn mount_pxe_configs(server: &MockServer) {
    let pxe_configs = serde_json::json!({"pxe_configs": ["ubuntu", "memtest", "rescue"]});
    Mock::given(method("GET"))
        .and(path(PXE_CONFIGS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(pxe_configs))
        .mount(server)
        .await;
}

pub async fn mount_models(server: &MockServer) {
    mount_devices(server).await;
    mount_pxe_configs(server).await;
}

/// Models must never be requested.
pub async fn forbid_models(server: &MockServer) {
    for at in [DEVICES_PATH, PXE_CONFIGS_PATH] {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(server)
            .await;
    }
}

pub fn ids(batch: &[&str]) -> Vec<ResourceId> {
    batch.iter().map(|s| ResourceId::new(*s).unwrap()).collect()
}

pub fn boot_config(server: &MockServer, batches: Vec<Vec<ResourceId>>) -> BootConfig {
    BootConfig {
        server: ServerConfig {
            base_url: format!("{}/ui/", server.uri()),
        },
        loader: LoaderConfig {
            timeout_seconds: 5,
            batches,
        },
        models: ModelsConfig::default(),
    }
}

/// Chain environment loading from the configured server, with an error log.
pub fn chain_env(config: &BootConfig) -> (ChainEnv, Arc<ErrorLog>) {
    let loader =
        ResourceLoader::with_timeout(config.base_url().unwrap(), config.loader.timeout()).unwrap();
    let log = Arc::new(ErrorLog::new());
    let sink: Arc<dyn ReportSink> = log.clone();
    (ChainEnv::new(sink).with_loader(Arc::new(loader)), log)
}

/// Write a config file pointing at `server` and return its path.
pub fn write_config(dir: &tempfile::TempDir, server: &MockServer, batches: &str) -> PathBuf {
    let content = format!(
        r#"[server]
base_url = "{}/ui/"

[loader]
timeout_seconds = 5
batches = {batches}
"#,
        server.uri()
    );
    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).unwrap();
    path
}
