pub mod registry;
pub mod resolver;

use crate::extension_control::defaults::{LOCAL_TARGET_HOST, LOCAL_TARGET_PORT};
use std::fmt::{Display, Formatter};

/// A validated installation target. The local target addresses the gateway's
/// own management port over plain HTTP, remote targets are fleet devices
/// reached over HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub trust_uuid: Option<String>,
    pub discovery_state: Option<String>,
}

impl Target {
    pub fn local() -> Self {
        Self {
            host: LOCAL_TARGET_HOST.to_string(),
            port: LOCAL_TARGET_PORT,
            trust_uuid: None,
            discovery_state: None,
        }
    }

    pub fn remote(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            trust_uuid: None,
            discovery_state: None,
        }
    }

    pub fn is_local(&self) -> bool {
        self.host == LOCAL_TARGET_HOST
    }

    fn scheme(&self) -> &'static str {
        if self.is_local() { "http" } else { "https" }
    }

    /// Absolute URL for a management path on this target.
    pub fn management_url(&self, path: &str) -> String {
        format!("{}://{}:{}{}", self.scheme(), self.host, self.port, path)
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Unvalidated addressing information taken from a request. An empty selector
/// addresses the local gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSelector {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub uuid: Option<String>,
}

/// A device listed in one of the gateway's trusted device groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedDevice {
    pub host: String,
    pub port: u16,
    pub uuid: Option<String>,
    pub discovery_state: Option<String>,
}

impl From<TrustedDevice> for Target {
    fn from(device: TrustedDevice) -> Self {
        Self {
            host: device.host,
            port: device.port,
            trust_uuid: device.uuid,
            discovery_state: device.discovery_state,
        }
    }
}
