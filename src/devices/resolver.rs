use super::registry::{DeviceRegistry, DeviceRegistryError};
use super::{Target, TargetSelector};
use crate::extension_control::defaults::{DEFAULT_REMOTE_PORT, LOCAL_TARGET_HOST};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("target {0} is not a trusted device")]
    Untrusted(String),
    #[error(transparent)]
    Registry(#[from] DeviceRegistryError),
}

/// Validates request addressing against the trusted device registry.
///
/// The local gateway is trusted without a lookup. Remote selectors must match
/// a registered device, either by address and port or by its opaque UUID.
pub struct TargetResolver<G> {
    devices: G,
}

impl<G> TargetResolver<G>
where
    G: DeviceRegistry,
{
    pub fn new(devices: G) -> Self {
        Self { devices }
    }

    pub async fn resolve(&self, selector: &TargetSelector) -> Result<Target, ResolveError> {
        if let Some(uuid) = &selector.uuid {
            return self.resolve_uuid(uuid).await;
        }
        match &selector.host {
            None => Ok(Target::local()),
            Some(host) if host == LOCAL_TARGET_HOST => Ok(Target::local()),
            Some(host) => {
                let port = selector.port.unwrap_or(DEFAULT_REMOTE_PORT);
                self.resolve_address(host, port).await
            }
        }
    }

    async fn resolve_uuid(&self, uuid: &str) -> Result<Target, ResolveError> {
        let device = self
            .devices
            .trusted_devices()
            .await?
            .into_iter()
            .find(|device| device.uuid.as_deref() == Some(uuid))
            .ok_or_else(|| ResolveError::Untrusted(uuid.to_string()))?;
        debug!(uuid, host = %device.host, "resolved target by device uuid");
        Ok(device.into())
    }

    async fn resolve_address(&self, host: &str, port: u16) -> Result<Target, ResolveError> {
        let device = self
            .devices
            .trusted_devices()
            .await?
            .into_iter()
            .find(|device| device.host == host && device.port == port)
            .ok_or_else(|| ResolveError::Untrusted(format!("{host}:{port}")))?;
        Ok(device.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::registry::MockDeviceRegistry;
    use crate::devices::TrustedDevice;
    use assert_matches::assert_matches;
    use url::Url;

    fn fleet() -> Vec<TrustedDevice> {
        vec![
            TrustedDevice {
                host: "172.17.0.2".to_string(),
                port: 443,
                uuid: Some("6f4ae424-86f5-4e8c-b0f9-2899a610d8f2".to_string()),
                discovery_state: Some("ACTIVE".to_string()),
            },
            TrustedDevice {
                host: "172.17.0.5".to_string(),
                port: 8443,
                uuid: None,
                discovery_state: Some("UNDISCOVERED".to_string()),
            },
        ]
    }

    fn resolver_with_fleet() -> TargetResolver<MockDeviceRegistry> {
        let mut devices = MockDeviceRegistry::new();
        devices
            .expect_trusted_devices()
            .returning(|| Ok(fleet()));
        TargetResolver::new(devices)
    }

    #[tokio::test]
    async fn empty_selector_addresses_the_local_gateway() {
        let mut devices = MockDeviceRegistry::new();
        devices.expect_trusted_devices().never();
        let resolver = TargetResolver::new(devices);

        let target = resolver.resolve(&TargetSelector::default()).await.unwrap();

        assert_eq!(target, Target::local());
    }

    #[tokio::test]
    async fn localhost_is_trusted_without_a_lookup_and_keeps_the_management_port() {
        let mut devices = MockDeviceRegistry::new();
        devices.expect_trusted_devices().never();
        let resolver = TargetResolver::new(devices);

        let selector = TargetSelector {
            host: Some("localhost".to_string()),
            port: Some(9999),
            uuid: None,
        };
        let target = resolver.resolve(&selector).await.unwrap();

        assert_eq!(target, Target::local());
    }

    #[tokio::test]
    async fn resolves_a_registered_device_by_address_and_port() {
        let resolver = resolver_with_fleet();

        let selector = TargetSelector {
            host: Some("172.17.0.5".to_string()),
            port: Some(8443),
            uuid: None,
        };
        let target = resolver.resolve(&selector).await.unwrap();

        assert_eq!(target.host, "172.17.0.5");
        assert_eq!(target.port, 8443);
        assert_eq!(target.discovery_state.as_deref(), Some("UNDISCOVERED"));
    }

    #[tokio::test]
    async fn missing_port_defaults_to_https() {
        let resolver = resolver_with_fleet();

        let selector = TargetSelector {
            host: Some("172.17.0.2".to_string()),
            port: None,
            uuid: None,
        };
        let target = resolver.resolve(&selector).await.unwrap();

        assert_eq!(target.port, DEFAULT_REMOTE_PORT);
    }

    #[tokio::test]
    async fn resolves_a_registered_device_by_uuid() {
        let resolver = resolver_with_fleet();

        let selector = TargetSelector {
            host: None,
            port: None,
            uuid: Some("6f4ae424-86f5-4e8c-b0f9-2899a610d8f2".to_string()),
        };
        let target = resolver.resolve(&selector).await.unwrap();

        assert_eq!(target.host, "172.17.0.2");
        assert_eq!(
            target.trust_uuid.as_deref(),
            Some("6f4ae424-86f5-4e8c-b0f9-2899a610d8f2")
        );
    }

    #[tokio::test]
    async fn unknown_devices_are_untrusted() {
        let resolver = resolver_with_fleet();

        let selector = TargetSelector {
            host: Some("10.0.0.1".to_string()),
            port: Some(443),
            uuid: None,
        };
        let err = resolver.resolve(&selector).await.unwrap_err();

        assert_matches!(err, ResolveError::Untrusted(target) => {
            assert_eq!(target, "10.0.0.1:443");
        });
    }

    #[tokio::test]
    async fn registry_failures_are_propagated() {
        let mut devices = MockDeviceRegistry::new();
        devices.expect_trusted_devices().returning(|| {
            Err(DeviceRegistryError::Url(
                Url::parse("not a url").unwrap_err(),
            ))
        });
        let resolver = TargetResolver::new(devices);

        let selector = TargetSelector {
            host: Some("172.17.0.2".to_string()),
            port: None,
            uuid: None,
        };
        let err = resolver.resolve(&selector).await.unwrap_err();

        assert_matches!(err, ResolveError::Registry(_));
    }
}
