use crate::common::{device_selector, live_control, wait_until_idle, FakeGateway};
use assert_matches::assert_matches;
use extension_control::devices::TargetSelector;
use extension_control::extension_control::error::OperationError;
use extension_control::extension_control::record::ExtensionState;
use httpmock::prelude::*;
use serde_json::json;
use std::time::Duration;

const TASKS_PATH: &str = "/mgmt/shared/iapp/package-management-tasks";
const ARTIFACT: &str = "demo rpm payload bytes!!";

#[tokio::test(flavor = "multi_thread")]
async fn an_extension_is_downloaded_uploaded_and_installed() {
    let device = MockServer::start_async().await;
    let gateway = FakeGateway::trusting_device_on(device.port()).await;
    let repo = MockServer::start_async().await;

    let artifact = repo
        .mock_async(|when, then| {
            when.method(GET).path("/repo/demo-0.1.0.rpm");
            then.status(200).body(ARTIFACT);
        })
        .await;
    device
        .mock_async(|when, then| {
            when.method(POST)
                .path(TASKS_PATH)
                .json_body(json!({ "operation": "QUERY" }));
            then.status(202).json_body(json!({ "id": "task-query" }));
        })
        .await;
    device
        .mock_async(|when, then| {
            when.method(GET).path(format!("{TASKS_PATH}/task-query"));
            then.status(200)
                .json_body(json!({ "status": "FINISHED", "queryResponse": [] }));
        })
        .await;
    let upload = device
        .mock_async(|when, then| {
            when.method(POST).path("/mgmt/shared/file-transfer/uploads/demo-0.1.0.rpm");
            then.status(200).json_body(json!({}));
        })
        .await;
    let install_submit = device
        .mock_async(|when, then| {
            when.method(POST).path(TASKS_PATH).json_body(json!({
                "operation": "INSTALL",
                "packageFilePath": "/var/config/rest/downloads/demo-0.1.0.rpm",
            }));
            then.status(202).json_body(json!({ "id": "task-install" }));
        })
        .await;
    let install_status = device
        .mock_async(|when, then| {
            when.method(GET).path(format!("{TASKS_PATH}/task-install"));
            then.status(200).json_body(json!({ "status": "FINISHED" }));
        })
        .await;

    let staging = tempfile::tempdir().unwrap();
    let control = live_control(&gateway, staging.path(), 10);
    let source_url = repo.url("/repo/demo-0.1.0.rpm");

    let record = control.install(&device_selector(), &source_url).await.unwrap();
    assert_eq!(record.state, ExtensionState::Requested);
    assert_eq!(record.rpm_file, "demo-0.1.0.rpm");

    wait_until_idle(&control, &device_selector()).await;

    artifact.assert_async().await;
    // 24 artifact bytes in chunks of 10: 0-9, 10-19 and 20-23.
    assert_eq!(upload.hits_async().await, 3);
    install_submit.assert_async().await;
    install_status.assert_async().await;
    let staged = staging.path().join("demo-0.1.0.rpm");
    assert_eq!(std::fs::read_to_string(staged).unwrap(), ARTIFACT);
}

#[tokio::test(flavor = "multi_thread")]
async fn a_failed_download_is_queryable_and_uninstall_clears_it() {
    let device = MockServer::start_async().await;
    let gateway = FakeGateway::trusting_device_on(device.port()).await;
    device
        .mock_async(|when, then| {
            when.method(POST)
                .path(TASKS_PATH)
                .json_body(json!({ "operation": "QUERY" }));
            then.status(202).json_body(json!({ "id": "task-query" }));
        })
        .await;
    device
        .mock_async(|when, then| {
            when.method(GET).path(format!("{TASKS_PATH}/task-query"));
            then.status(200)
                .json_body(json!({ "status": "FINISHED", "queryResponse": [] }));
        })
        .await;

    let staging = tempfile::tempdir().unwrap();
    let control = live_control(&gateway, staging.path(), 512_000);
    // Nothing listens on port 9, the download fails with a transport error.
    let source_url = "http://127.0.0.1:9/repo/demo-0.1.0.rpm";

    control.install(&device_selector(), source_url).await.unwrap();

    let mut failed = None;
    for _ in 0..150 {
        let extensions = control.query(&device_selector()).await.unwrap();
        if let Some(record) = extensions
            .into_iter()
            .find(|record| record.state == ExtensionState::Error)
        {
            failed = Some(record);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let record = failed.expect("the failed download should leave an error record");
    assert!(record.tags[0].starts_with("err: could not download demo-0.1.0.rpm"));

    // The failed record still owns its key, a second install is a duplicate.
    let err = control
        .install(&device_selector(), source_url)
        .await
        .unwrap_err();
    assert_matches!(err, OperationError::DuplicateOperation { state, .. } => {
        assert_eq!(state, "ERROR");
    });

    // Uninstalling clears the record even though nothing was installed.
    let message = control
        .uninstall(&device_selector(), source_url)
        .await
        .unwrap();
    assert!(message.contains("uninstalled"));
    assert!(control.query(&device_selector()).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn an_unregistered_address_is_rejected() {
    let device = MockServer::start_async().await;
    let gateway = FakeGateway::trusting_device_on(device.port()).await;

    let staging = tempfile::tempdir().unwrap();
    let control = live_control(&gateway, staging.path(), 512_000);
    let selector = TargetSelector {
        host: Some("10.0.0.9".to_string()),
        port: Some(443),
        ..Default::default()
    };

    let err = control
        .install(&selector, "https://repo.example.com/demo-0.1.0.rpm")
        .await
        .unwrap_err();

    assert_matches!(err, OperationError::UntrustedTarget(target) => {
        assert_eq!(target, "10.0.0.9:443");
    });
}
