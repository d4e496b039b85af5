//! Device-control capability
//!
//! The gateway never speaks the device protocol itself. Anything that can
//! query and switch a device given a [`DeviceHandle`] plugs in here, which
//! also lets tests substitute fake devices.

use async_trait::async_trait;
use thiserror::Error;

use crate::device::DeviceHandle;
use crate::status::StatusPayload;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    #[error("Device did not respond within {0}s")]
    Timeout(u64),
    #[error("Device rejected the request: {0}")]
    Rejected(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ControlError {
    /// Short machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "Timeout",
            Self::Rejected(_) => "Rejected",
            Self::Transport(_) => "Transport",
            Self::InvalidResponse(_) => "InvalidResponse",
        }
    }
}

/// Operations supported on a single outlet
#[async_trait]
pub trait DeviceControl: Send + Sync {
    /// Query the current status document
    async fn status(&self) -> Result<StatusPayload, ControlError>;

    /// Switch the outlet on
    async fn turn_on(&self) -> Result<(), ControlError>;

    /// Switch the outlet off
    async fn turn_off(&self) -> Result<(), ControlError>;
}

/// Creates device-control clients for resolved devices
pub trait DeviceConnector: Send + Sync {
    fn connect(&self, handle: &DeviceHandle) -> Box<dyn DeviceControl>;
}
