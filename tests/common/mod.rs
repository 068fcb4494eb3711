use extension_control::devices::registry::HttpDeviceRegistry;
use extension_control::devices::resolver::TargetResolver;
use extension_control::devices::TargetSelector;
use extension_control::extension_control::ExtensionControl;
use extension_control::http::config::HttpConfig;
use extension_control::http::reqwest::try_build_reqwest_client;
use extension_control::staging::HttpArtifactStager;
use extension_control::tasks::HttpPackageTaskDriver;
use extension_control::upload::token::GatewayTokenProvider;
use extension_control::upload::uploader::ChunkedUploader;
use httpmock::prelude::*;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const DEVICE_UUID: &str = "6f4ae424-86f5-4e8c-b0f9-2899a610d8f2";

pub type LiveControl = ExtensionControl<
    HttpDeviceRegistry,
    HttpArtifactStager,
    ChunkedUploader<GatewayTokenProvider>,
    HttpPackageTaskDriver,
>;

/// Fake management gateway whose single trusted device group lists one
/// device. The device address is `localhost` so the engine talks plain HTTP
/// to the fake device server listening on `device_port`.
pub struct FakeGateway {
    server: MockServer,
}

impl FakeGateway {
    pub async fn trusting_device_on(device_port: u16) -> Self {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/mgmt/shared/resolver/device-groups");
                then.status(200)
                    .json_body(json!({ "items": [{ "groupName": "dockerContainers" }] }));
            })
            .await;
        server
            .mock_async(move |when, then| {
                when.method(GET)
                    .path("/mgmt/shared/resolver/device-groups/dockerContainers/devices");
                then.status(200).json_body(json!({
                    "items": [{
                        "address": "localhost",
                        "httpsPort": device_port,
                        "machineId": DEVICE_UUID,
                        "mcpDeviceName": "extension-target",
                        "state": "ACTIVE",
                    }]
                }));
            })
            .await;
        Self { server }
    }

    pub fn endpoint(&self) -> Url {
        Url::parse(&self.server.base_url()).unwrap()
    }
}

/// Selector addressing the fake device through its registered UUID.
pub fn device_selector() -> TargetSelector {
    TargetSelector {
        uuid: Some(DEVICE_UUID.to_string()),
        ..Default::default()
    }
}

/// Engine wired with the real HTTP collaborators: fast task polling, small
/// upload chunks, staging in the given directory.
pub fn live_control(gateway: &FakeGateway, staging_dir: &Path, chunk_size: u64) -> LiveControl {
    let timeout = Duration::from_secs(5);
    let conn_timeout = Duration::from_secs(2);
    let gateway_client = try_build_reqwest_client(HttpConfig::new(timeout, conn_timeout)).unwrap();
    let device_client = try_build_reqwest_client(HttpConfig::new(timeout, conn_timeout)).unwrap();
    let download_client =
        try_build_reqwest_client(HttpConfig::new(timeout, conn_timeout).with_manual_redirects())
            .unwrap();

    let devices = HttpDeviceRegistry::new(gateway_client.clone(), gateway.endpoint(), "dockerContainers");
    let stager = HttpArtifactStager::new(download_client, staging_dir);
    let tokens = GatewayTokenProvider::new(gateway_client, gateway.endpoint());
    let uploader = ChunkedUploader::new(device_client.clone(), staging_dir, chunk_size, tokens);
    let tasks =
        HttpPackageTaskDriver::new(device_client).with_poll_interval(Duration::from_millis(20));

    ExtensionControl::new(
        TargetResolver::new(devices),
        stager,
        uploader,
        tasks,
        Duration::from_secs(2),
        staging_dir.to_string_lossy(),
    )
}

/// Waits until queries stop reporting records for the selector, meaning the
/// in-flight pipeline has completed and released its claim.
pub async fn wait_until_idle(control: &LiveControl, selector: &TargetSelector) {
    for _ in 0..150 {
        let extensions = control.query(selector).await.unwrap();
        if extensions.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("the pipeline did not drain in time");
}
