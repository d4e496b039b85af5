//! Device resolution: identifier -> ready-to-use device handle

use plugway_core::{CatalogError, DeviceHandle, DeviceId};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::registry::{DeviceCatalog, LocationCache};

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Device {0} not found")]
    NotFound(String),
    #[error("No IP for device {0}, it has not been located by a scan yet")]
    Unreachable(DeviceId),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl ResolveError {
    /// Short machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "DeviceNotFound",
            Self::Unreachable(_) => "DeviceUnreachable",
            Self::Catalog(_) => "CatalogLoadError",
        }
    }
}

/// Catalog device with its current location, without credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub id: DeviceId,
    pub name: Option<String>,
    pub version: String,
    pub ip: Option<IpAddr>,
}

/// Resolves ids and display names against the catalog and location cache
///
/// Every call reloads the catalog so edits take effect on the next request.
#[derive(Clone)]
pub struct Resolver {
    catalog: Arc<DeviceCatalog>,
    locations: Arc<LocationCache>,
}

impl Resolver {
    pub fn new(catalog: Arc<DeviceCatalog>, locations: Arc<LocationCache>) -> Self {
        Self { catalog, locations }
    }

    /// Resolve a device id or display name to a handle
    pub async fn resolve(&self, identifier: &str) -> Result<DeviceHandle, ResolveError> {
        let catalog = self.catalog.load().await?;

        let (id, entry) = catalog
            .lookup(identifier)
            .ok_or_else(|| ResolveError::NotFound(identifier.to_string()))?;

        let ip = self
            .locations
            .get(id.as_str())
            .await
            .ok_or_else(|| ResolveError::Unreachable(id.clone()))?;

        debug!(identifier = identifier, device = %id, ip = %ip, "Resolved device");

        Ok(DeviceHandle {
            id: id.clone(),
            ip,
            local_key: entry.local_key.clone(),
            version: entry.version.clone(),
        })
    }

    /// All catalog devices, in catalog order, with their known locations
    pub async fn devices(&self) -> Result<Vec<DeviceSummary>, ResolveError> {
        let catalog = self.catalog.load().await?;
        let locations = self.locations.snapshot().await;

        Ok(catalog
            .iter()
            .map(|(id, entry)| DeviceSummary {
                id: id.clone(),
                name: entry.name.clone(),
                version: entry.version.clone(),
                ip: locations.get(id).copied(),
            })
            .collect())
    }
}
