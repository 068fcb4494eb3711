//! # Helpers to build the reqwest clients used against gateway and devices
use super::config::HttpConfig;
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
#[error("could not build the reqwest client: {0}")]
pub struct ReqwestBuildError(String);

/// Builds a reqwest client according to the provided configuration.
pub fn try_build_reqwest_client(config: HttpConfig) -> Result<Client, ReqwestBuildError> {
    let mut builder = reqwest_builder_with_timeout(config.timeout, config.conn_timeout);
    if config.accept_invalid_certs {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if config.manual_redirects {
        builder = builder.redirect(Policy::none());
    }
    builder
        .build()
        .map_err(|err| ReqwestBuildError(err.to_string()))
}

/// Returns a reqwest [ClientBuilder] with the default setup and the provided timeout values.
pub fn reqwest_builder_with_timeout(timeout: Duration, conn_timeout: Duration) -> ClientBuilder {
    Client::builder()
        .use_rustls_tls() // Use rust-tls backend
        .timeout(timeout)
        .connect_timeout(conn_timeout)
}
