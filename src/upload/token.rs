use crate::extension_control::defaults::{LOCAL_ADMIN_USER, LOCAL_TARGET_HOST, TOKEN_PATH};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("upload token request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid token endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

/// Ephemeral authorization for uploads to a remote device. The device accepts
/// it as a query string appended to the upload path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadToken {
    #[serde(rename = "queryParam")]
    query_param: String,
}

impl UploadToken {
    pub fn new(query_param: impl Into<String>) -> Self {
        Self {
            query_param: query_param.into(),
        }
    }

    pub fn query_param(&self) -> &str {
        &self.query_param
    }
}

/// Issues upload authorization for a target host.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UploadTokenProvider: Send + Sync {
    /// A token for the given host, or `None` when the target is the local
    /// gateway and the fixed admin credentials apply instead.
    async fn upload_token(&self, target_host: &str) -> Result<Option<UploadToken>, TokenError>;
}

/// Fetches upload tokens from the gateway's token service.
pub struct GatewayTokenProvider {
    client: reqwest::Client,
    endpoint: Url,
}

impl GatewayTokenProvider {
    pub fn new(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl UploadTokenProvider for GatewayTokenProvider {
    async fn upload_token(&self, target_host: &str) -> Result<Option<UploadToken>, TokenError> {
        if target_host == LOCAL_TARGET_HOST {
            return Ok(None);
        }
        let url = self.endpoint.join(TOKEN_PATH)?;
        let token = self
            .client
            .post(url)
            .basic_auth(LOCAL_ADMIN_USER, Some(""))
            .json(&serde_json::json!({ "address": target_host }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(Some(token))
    }
}
