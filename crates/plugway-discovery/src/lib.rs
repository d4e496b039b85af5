//! plugway Discovery - Device registry and scan coordination
//!
//! This crate owns the gateway's shared state:
//! - The reloadable device catalog and the location cache
//! - The scan coordinator, which runs at most one LAN scan at a time
//! - The resolver, which turns an id or display name into a device handle

pub mod registry;
pub mod resolver;
pub mod scanner;

pub use registry::{DeviceCatalog, LocationCache, ReloadPolicy};
pub use resolver::{DeviceSummary, ResolveError, Resolver};
pub use scanner::{
    Discovery, DiscoveryError, FailurePolicy, ScanCoordinator, ScanError, ScanOutcome, ScanReport,
    ScannedDevice,
};
