//! Admin bootstrap end to end against a mock pool server.

use stepchain_admin::{AdminApp, AdminSession};
use stepchain_loader::LoadedScript;
use stepchain_sequencer::ChainOutcome;
use wiremock::MockServer;

use crate::common::{
    DEVICES_PATH, boot_config, chain_env, forbid_models, ids, mount_models, mount_pxe_configs,
    mount_script, mount_status,
};

#[tokio::test]
async fn bootstrap_loads_scripts_then_builds_session() {
    let server = MockServer::start().await;
    mount_script(&server, "/lib/jquery.min.js", "window.jQuery = {};").await;
    mount_script(&server, "/lib/backbone-min.js", "window.Backbone = {};").await;
    mount_script(&server, "/ui/js/models.js", "var Devices;").await;
    mount_script(&server, "/ui/js/views.js", "var DeviceTableView;").await;
    mount_models(&server).await;

    let config = boot_config(
        &server,
        vec![
            ids(&["/lib/jquery.min.js"]),
            ids(&["/lib/backbone-min.js"]),
            ids(&["js/models.js", "js/views.js"]),
        ],
    );
    let (env, log) = chain_env(&config);
    let app = AdminApp::from_config(&config).unwrap();

    let outcome = app.run_ui().execute(&env).await;

    assert_eq!(outcome, ChainOutcome::Completed { steps: 3 });
    assert!(!log.is_visible(), "unexpected errors: {}", log.render());

    let session = env.context().get::<AdminSession>(AdminSession::KEY).unwrap();
    assert_eq!(session.devices.names(), vec!["dev1", "dev2"]);
    assert_eq!(session.pxe_configs.names, vec!["ubuntu", "memtest", "rescue"]);

    let views = env
        .context()
        .get::<LoadedScript>(&LoadedScript::key(&ids(&["js/views.js"])[0]))
        .unwrap();
    assert_eq!(views.source, "var DeviceTableView;");
}

#[tokio::test]
async fn failed_model_fetch_is_reported_and_stalls() {
    let server = MockServer::start().await;
    mount_script(&server, "/lib/jquery.min.js", "window.jQuery = {};").await;
    mount_status(&server, DEVICES_PATH, 404).await;
    mount_pxe_configs(&server).await;

    let config = boot_config(&server, vec![ids(&["/lib/jquery.min.js"])]);
    let (env, log) = chain_env(&config);
    let app = AdminApp::from_config(&config).unwrap();

    let outcome = app.run_ui().execute(&env).await;

    assert_eq!(
        outcome,
        ChainOutcome::Stalled {
            step: 1,
            abandoned: vec!["devices".to_string()],
        }
    );
    assert_eq!(log.messages(), vec!["AJAX Error while fetching devices: Not Found"]);
    assert!(env.context().contains("pxe_configs"));
    assert!(!env.context().contains(AdminSession::KEY));
}

#[tokio::test]
async fn failed_script_stalls_before_models_are_fetched() {
    let server = MockServer::start().await;
    mount_script(&server, "/lib/jquery.min.js", "window.jQuery = {};").await;
    mount_status(&server, "/lib/underscore-min.js", 404).await;
    forbid_models(&server).await;

    let config = boot_config(
        &server,
        vec![
            ids(&["/lib/jquery.min.js", "/lib/underscore-min.js"]),
            ids(&["/ui/js/models.js"]),
        ],
    );
    let (env, log) = chain_env(&config);
    let app = AdminApp::from_config(&config).unwrap();

    let outcome = app.run_ui().execute(&env).await;

    assert_eq!(
        outcome,
        ChainOutcome::Stalled {
            step: 0,
            abandoned: vec!["setup_ui".to_string()],
        }
    );
    assert_eq!(
        log.messages(),
        vec![
            "Failed to load /lib/underscore-min.js: fetching /lib/underscore-min.js returned HTTP 404"
        ]
    );
}
