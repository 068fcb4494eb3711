use super::defaults::{
    DEFAULT_DEVICE_GROUP, DEFAULT_GATEWAY_ENDPOINT, DEFAULT_HTTP_CONN_TIMEOUT,
    DEFAULT_HTTP_TIMEOUT, DEFAULT_STAGING_DIR, DEFAULT_TASK_POLL_INTERVAL, DEFAULT_TASK_TIMEOUT,
    DEFAULT_UPLOAD_CHUNK_SIZE,
};
use super::http_server::config::ServerConfig;
use crate::instrumentation::LoggingConfig;
use duration_str::deserialize_duration;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    Load {
        path: String,
        source: std::io::Error,
    },
    #[error("error parsing yaml: `{0}`")]
    SerdeYaml(#[from] serde_yaml::Error),
}

/// Top level configuration of the service. Every section falls back to its
/// defaults, so an empty or missing file yields a working local setup.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct ExtensionControlConfig {
    pub log: LoggingConfig,
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub staging: StagingConfig,
    pub upload: UploadConfig,
    pub tasks: TasksConfig,
    pub http: HttpClientConfig,
}

impl ExtensionControlConfig {
    /// Loads the configuration from a YAML file. No path means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Load {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Where the local management gateway is reached for device listings and
/// upload tokens.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub endpoint: Url,
    pub default_group: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_GATEWAY_ENDPOINT)
                .expect("the default gateway endpoint is a valid url"),
            default_group: DEFAULT_DEVICE_GROUP.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Directory where downloaded artifacts are staged before upload.
    pub dir: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir: DEFAULT_STAGING_DIR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub chunk_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct TasksConfig {
    pub poll_interval: TaskPollInterval,
    pub timeout: TaskTimeout,
}

/// Delay between two status polls of a package management task.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TaskPollInterval(#[serde(deserialize_with = "deserialize_duration")] Duration);

impl Default for TaskPollInterval {
    fn default() -> Self {
        Self(DEFAULT_TASK_POLL_INTERVAL)
    }
}

impl From<TaskPollInterval> for Duration {
    fn from(value: TaskPollInterval) -> Self {
        value.0
    }
}

/// How long a package management task may keep polling before it is given up.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TaskTimeout(#[serde(deserialize_with = "deserialize_duration")] Duration);

impl Default for TaskTimeout {
    fn default() -> Self {
        Self(DEFAULT_TASK_TIMEOUT)
    }
}

impl From<TaskTimeout> for Duration {
    fn from(value: TaskTimeout) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct HttpClientConfig {
    pub timeout: HttpTimeout,
    pub conn_timeout: HttpConnTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct HttpTimeout(#[serde(deserialize_with = "deserialize_duration")] Duration);

impl Default for HttpTimeout {
    fn default() -> Self {
        Self(DEFAULT_HTTP_TIMEOUT)
    }
}

impl From<HttpTimeout> for Duration {
    fn from(value: HttpTimeout) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct HttpConnTimeout(#[serde(deserialize_with = "deserialize_duration")] Duration);

impl Default for HttpConnTimeout {
    fn default() -> Self {
        Self(DEFAULT_HTTP_CONN_TIMEOUT)
    }
}

impl From<HttpConnTimeout> for Duration {
    fn from(value: HttpConnTimeout) -> Self {
        value.0
    }
}
