use super::TrustedDevice;
use crate::extension_control::defaults::{DEVICE_GROUPS_PATH, LOCAL_ADMIN_USER};
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

const UNDISCOVERED_STATE: &str = "UNDISCOVERED";

#[derive(Error, Debug)]
pub enum DeviceRegistryError {
    #[error("device registry request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid device registry url: {0}")]
    Url(#[from] url::ParseError),
}

/// Source of the trusted devices an operation may address.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn trusted_devices(&self) -> Result<Vec<TrustedDevice>, DeviceRegistryError>;
}

#[derive(Deserialize)]
struct DeviceGroupsBody {
    #[serde(default)]
    items: Option<Vec<DeviceGroup>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceGroup {
    group_name: String,
}

#[derive(Deserialize)]
struct GroupDevicesBody {
    #[serde(default)]
    items: Vec<Device>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Device {
    address: String,
    https_port: u16,
    state: String,
    mcp_device_name: Option<String>,
    machine_id: Option<String>,
}

impl Device {
    /// A device counts as trusted once discovery assigned it a device name,
    /// or while it is still undiscovered after being added to a group.
    fn is_trusted(&self) -> bool {
        self.mcp_device_name.is_some() || self.state == UNDISCOVERED_STATE
    }
}

impl From<Device> for TrustedDevice {
    fn from(device: Device) -> Self {
        Self {
            host: device.address,
            port: device.https_port,
            uuid: device.machine_id,
            discovery_state: Some(device.state),
        }
    }
}

/// Client for the gateway's device-group resolver endpoints.
pub struct HttpDeviceRegistry {
    client: reqwest::Client,
    endpoint: Url,
    default_group: String,
}

impl HttpDeviceRegistry {
    pub fn new(client: reqwest::Client, endpoint: Url, default_group: impl Into<String>) -> Self {
        Self {
            client,
            endpoint,
            default_group: default_group.into(),
        }
    }

    /// Names of the device groups to scan. A gateway that has never trusted a
    /// device reports no groups at all, in which case the default group is
    /// created and scanned.
    async fn device_groups(&self) -> Result<Vec<String>, DeviceRegistryError> {
        let url = self.endpoint.join(DEVICE_GROUPS_PATH)?;
        let body: DeviceGroupsBody = self
            .client
            .get(url)
            .basic_auth(LOCAL_ADMIN_USER, Some(""))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match body.items {
            Some(groups) => Ok(groups.into_iter().map(|g| g.group_name).collect()),
            None => {
                self.ensure_default_group().await?;
                Ok(vec![self.default_group.clone()])
            }
        }
    }

    /// Creates the default device group.
    pub async fn ensure_default_group(&self) -> Result<(), DeviceRegistryError> {
        let url = self.endpoint.join(DEVICE_GROUPS_PATH)?;
        self.client
            .post(url)
            .basic_auth(LOCAL_ADMIN_USER, Some(""))
            .json(&serde_json::json!({ "groupName": self.default_group }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn group_devices(&self, group: &str) -> Result<Vec<TrustedDevice>, DeviceRegistryError> {
        let url = self
            .endpoint
            .join(&format!("{DEVICE_GROUPS_PATH}/{group}/devices"))?;
        let body: GroupDevicesBody = self
            .client
            .get(url)
            .basic_auth(LOCAL_ADMIN_USER, Some(""))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(body
            .items
            .into_iter()
            .filter(Device::is_trusted)
            .map(TrustedDevice::from)
            .collect())
    }
}

#[async_trait]
impl DeviceRegistry for HttpDeviceRegistry {
    async fn trusted_devices(&self) -> Result<Vec<TrustedDevice>, DeviceRegistryError> {
        let mut devices = Vec::new();
        for group in self.device_groups().await? {
            devices.extend(self.group_devices(&group).await?);
        }
        Ok(devices)
    }
}
