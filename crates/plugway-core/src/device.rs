//! Device identity and resolved device handles

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Protocol version assumed when the catalog does not declare one
pub const DEFAULT_PROTOCOL_VERSION: &str = "3.4";

/// Stable identifier for a device, as used for the catalog key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::borrow::Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Everything a device-control client needs to talk to one device
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Catalog key of the device
    pub id: DeviceId,
    /// Address the device was last located at
    pub ip: IpAddr,
    /// Local encryption key from the catalog
    pub local_key: String,
    /// Device protocol version (e.g. "3.3", "3.4")
    pub version: String,
}

/// A device observed responding on the LAN during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub id: DeviceId,
    pub ip: IpAddr,
}

// The local key is a credential, keep it out of logs.
impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("id", &self.id)
            .field("ip", &self.ip)
            .field("local_key", &"<redacted>")
            .field("version", &self.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_device_id_display() {
        let id = DeviceId::new("bf1234567890abcdef");
        assert_eq!(id.as_str(), "bf1234567890abcdef");
        assert_eq!(id.to_string(), "bf1234567890abcdef");
    }

    #[test]
    fn test_handle_debug_redacts_key() {
        let handle = DeviceHandle {
            id: DeviceId::from("A"),
            ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
            local_key: "s3cr3t-key".to_string(),
            version: DEFAULT_PROTOCOL_VERSION.to_string(),
        };
        let debug = format!("{:?}", handle);
        assert!(!debug.contains("s3cr3t-key"));
        assert!(debug.contains("10.0.0.5"));
    }
}
