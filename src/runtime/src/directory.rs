//! Device directory: where watched engines live and how to reach them.

use a3s_watch_core::config::DeviceConfig;
use a3s_watch_core::error::{Result, WatchError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A host running a container engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub uuid: String,
    pub ip: String,
    #[serde(default)]
    pub hostname: Option<String>,
}

/// Connection details for a device's engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuth {
    pub device_uuid: String,
    #[serde(default)]
    pub engine_url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

/// Lookup of devices and their credentials.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn find_device_by_uuid(&self, uuid: &str) -> Result<Option<Device>>;

    async fn find_auth_by_device_uuid(&self, uuid: &str) -> Result<Option<DeviceAuth>>;
}

/// Directory backed by the `devices` section of the configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticDeviceDirectory {
    devices: HashMap<String, (Device, DeviceAuth)>,
}

impl StaticDeviceDirectory {
    pub fn from_config(devices: &[DeviceConfig]) -> Result<Self> {
        let mut map = HashMap::new();
        for config in devices {
            if config.uuid.trim().is_empty() {
                return Err(WatchError::invalid_field("device", "uuid"));
            }
            let device = Device {
                uuid: config.uuid.clone(),
                ip: config.ip.clone(),
                hostname: config.hostname.clone(),
            };
            let auth = DeviceAuth {
                device_uuid: config.uuid.clone(),
                engine_url: config.engine_url.clone(),
                username: config.username.clone(),
                password: config.password.clone(),
            };
            if map.insert(config.uuid.clone(), (device, auth)).is_some() {
                tracing::warn!(device = %config.uuid, "Duplicate device entry; keeping the last one");
            }
        }
        Ok(Self { devices: map })
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[async_trait]
impl DeviceDirectory for StaticDeviceDirectory {
    async fn find_device_by_uuid(&self, uuid: &str) -> Result<Option<Device>> {
        Ok(self.devices.get(uuid).map(|(device, _)| device.clone()))
    }

    async fn find_auth_by_device_uuid(&self, uuid: &str) -> Result<Option<DeviceAuth>> {
        Ok(self.devices.get(uuid).map(|(_, auth)| auth.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(uuid: &str) -> DeviceConfig {
        DeviceConfig {
            uuid: uuid.to_string(),
            ip: "192.168.1.10".to_string(),
            hostname: Some("nas".to_string()),
            engine_url: None,
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
        }
    }

    #[tokio::test]
    async fn test_lookup() {
        let directory = StaticDeviceDirectory::from_config(&[device("d-1")]).unwrap();
        let found = directory.find_device_by_uuid("d-1").await.unwrap().unwrap();
        assert_eq!(found.ip, "192.168.1.10");
        let auth = directory.find_auth_by_device_uuid("d-1").await.unwrap().unwrap();
        assert_eq!(auth.username.as_deref(), Some("admin"));
        assert!(directory.find_device_by_uuid("d-2").await.unwrap().is_none());
    }

    #[test]
    fn test_empty_uuid_rejected() {
        let err = StaticDeviceDirectory::from_config(&[device(" ")]).unwrap_err();
        assert!(matches!(err, WatchError::ConfigValidation { .. }));
    }

    #[test]
    fn test_password_not_serialized() {
        let auth = DeviceAuth {
            device_uuid: "d-1".to_string(),
            password: Some("secret".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&auth).unwrap();
        assert!(!json.contains("secret"));
    }
}
