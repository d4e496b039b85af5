//! Device-control client backed by the bridge helper

use async_trait::async_trait;
use plugway_core::{ControlError, DeviceConnector, DeviceControl, DeviceHandle, StatusPayload};
use std::sync::Arc;
use tracing::{debug, info};

use crate::transport::{BridgeError, BridgeTransport};

/// Environment variable carrying the device's local key to the helper
pub const LOCAL_KEY_ENV: &str = "PLUGWAY_LOCAL_KEY";

impl From<BridgeError> for ControlError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::InvalidOutput(msg) => ControlError::InvalidResponse(msg),
            other => ControlError::Transport(other.to_string()),
        }
    }
}

/// Client for one resolved device
pub struct BridgeClient {
    transport: Arc<BridgeTransport>,
    handle: DeviceHandle,
}

impl BridgeClient {
    pub fn new(transport: Arc<BridgeTransport>, handle: DeviceHandle) -> Self {
        Self { transport, handle }
    }

    fn device_flags(&self) -> [(&'static str, String); 3] {
        [
            ("id", self.handle.id.to_string()),
            ("ip", self.handle.ip.to_string()),
            ("version", self.handle.version.clone()),
        ]
    }

    // The key stays out of argv, which other local users can read.
    fn device_env(&self) -> [(&'static str, &str); 1] {
        [(LOCAL_KEY_ENV, self.handle.local_key.as_str())]
    }

    /// Run a switch command, checking any status document it prints
    async fn switch(&self, subcommand: &str) -> Result<(), ControlError> {
        info!(device = %self.handle.id, ip = %self.handle.ip, command = subcommand, "Switching device");

        let printed = self
            .transport
            .invoke_json(subcommand, &self.device_flags(), &self.device_env())
            .await?;
        if let Some(value) = printed {
            if let Some(error) = StatusPayload::new(value).error() {
                return Err(ControlError::Rejected(error));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceControl for BridgeClient {
    async fn status(&self) -> Result<StatusPayload, ControlError> {
        debug!(device = %self.handle.id, ip = %self.handle.ip, "Querying device status");

        let value = self
            .transport
            .invoke_json("status", &self.device_flags(), &self.device_env())
            .await?
            .ok_or_else(|| ControlError::InvalidResponse("empty status".to_string()))?;

        if !value.is_object() {
            return Err(ControlError::InvalidResponse(format!(
                "status is not an object: {}",
                value
            )));
        }

        let payload = StatusPayload::new(value);
        if let Some(error) = payload.error() {
            return Err(ControlError::Rejected(error));
        }
        Ok(payload)
    }

    async fn turn_on(&self) -> Result<(), ControlError> {
        self.switch("on").await
    }

    async fn turn_off(&self) -> Result<(), ControlError> {
        self.switch("off").await
    }
}

/// Hands out [`BridgeClient`]s sharing one transport
#[derive(Debug, Clone)]
pub struct BridgeConnector {
    transport: Arc<BridgeTransport>,
}

impl BridgeConnector {
    pub fn new(transport: Arc<BridgeTransport>) -> Self {
        Self { transport }
    }
}

impl DeviceConnector for BridgeConnector {
    fn connect(&self, handle: &DeviceHandle) -> Box<dyn DeviceControl> {
        Box::new(BridgeClient::new(self.transport.clone(), handle.clone()))
    }
}
