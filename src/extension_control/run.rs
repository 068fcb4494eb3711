use super::config::ExtensionControlConfig;
use super::http_server::server::run_extension_server;
use super::http_server::ServerError;
use super::ExtensionControl;
use crate::devices::registry::HttpDeviceRegistry;
use crate::devices::resolver::TargetResolver;
use crate::http::config::HttpConfig;
use crate::http::reqwest::{try_build_reqwest_client, ReqwestBuildError};
use crate::staging::HttpArtifactStager;
use crate::tasks::HttpPackageTaskDriver;
use crate::upload::token::GatewayTokenProvider;
use crate::upload::uploader::ChunkedUploader;
use thiserror::Error;
use tracing::debug;

/// The production engine, wired with the HTTP implementations of every
/// collaborator.
pub type HttpExtensionControl = ExtensionControl<
    HttpDeviceRegistry,
    HttpArtifactStager,
    ChunkedUploader<GatewayTokenProvider>,
    HttpPackageTaskDriver,
>;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("could not start the async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    HttpClient(#[from] ReqwestBuildError),
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Owns the configured service and drives it to completion on its own tokio
/// runtime.
pub struct ExtensionControlRunner {
    config: ExtensionControlConfig,
}

impl ExtensionControlRunner {
    pub fn new(config: ExtensionControlConfig) -> Self {
        Self { config }
    }

    pub fn run(self) -> Result<(), RunError> {
        debug!("initializing and starting extension control");
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        let server_config = self.config.server.clone();
        let control = build_control(&self.config)?;
        runtime.block_on(run_extension_server(control, server_config))?;
        Ok(())
    }
}

/// Builds the engine and its three HTTP clients. The gateway is reached with
/// standard TLS verification, fleet devices present self-signed management
/// certificates, and the download client resolves redirects itself.
fn build_control(config: &ExtensionControlConfig) -> Result<HttpExtensionControl, ReqwestBuildError> {
    let timeout = config.http.timeout.into();
    let conn_timeout = config.http.conn_timeout.into();

    let gateway_client = try_build_reqwest_client(HttpConfig::new(timeout, conn_timeout))?;
    let device_client =
        try_build_reqwest_client(HttpConfig::new(timeout, conn_timeout).with_relaxed_tls())?;
    let download_client = try_build_reqwest_client(
        HttpConfig::new(timeout, conn_timeout)
            .with_relaxed_tls()
            .with_manual_redirects(),
    )?;

    let devices = HttpDeviceRegistry::new(
        gateway_client.clone(),
        config.gateway.endpoint.clone(),
        config.gateway.default_group.clone(),
    );
    let stager = HttpArtifactStager::new(download_client, config.staging.dir.clone());
    let tokens = GatewayTokenProvider::new(gateway_client, config.gateway.endpoint.clone());
    let uploader = ChunkedUploader::new(
        device_client.clone(),
        config.staging.dir.clone(),
        config.upload.chunk_size,
        tokens,
    );
    let tasks = HttpPackageTaskDriver::new(device_client)
        .with_poll_interval(config.tasks.poll_interval.into());

    Ok(ExtensionControl::new(
        TargetResolver::new(devices),
        stager,
        uploader,
        tasks,
        config.tasks.timeout.into(),
        config.staging.dir.clone(),
    ))
}
