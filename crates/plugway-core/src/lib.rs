//! plugway Core - Core types, device catalog, and device-control capabilities
//!
//! This crate provides the foundational types for the plugway gateway:
//! - Device identifiers and ready-to-use device handles
//! - The on-disk device catalog format (ids, names, local keys, protocol versions)
//! - Device status payloads and on/off indicator interpretation
//! - The capability traits a device-control client implements

pub mod catalog;
pub mod control;
pub mod device;
pub mod status;

pub use catalog::{Catalog, CatalogEntry, CatalogError};
pub use control::{ControlError, DeviceConnector, DeviceControl};
pub use device::{DeviceHandle, DiscoveredDevice, DeviceId, DEFAULT_PROTOCOL_VERSION};
pub use status::{StatusPayload, SWITCH_DPS};
