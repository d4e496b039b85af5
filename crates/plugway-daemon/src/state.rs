//! Application state management

use anyhow::{Context, Result};
use plugway_bridge::{BridgeConnector, BridgeTransport};
use plugway_core::DeviceConnector;
use plugway_discovery::{DeviceCatalog, Discovery, LocationCache, Resolver, ScanCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Config;

/// Shared application state
pub struct AppState {
    /// Discovery scan coordinator
    pub scanner: Arc<ScanCoordinator>,
    /// Identifier to device handle resolution
    pub resolver: Resolver,
    /// Device-control client factory
    pub connector: Arc<dyn DeviceConnector>,
    /// Configuration
    pub config: Config,
}

impl AppState {
    /// Create application state talking to devices through the bridge helper
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let transport = Arc::new(BridgeTransport::new(
            config.client.program.clone(),
            config.client.args.clone(),
        ));
        info!(program = %transport.program(), "Using device bridge");

        let connector = Arc::new(BridgeConnector::new(transport.clone()));
        Self::with_parts(config, transport, connector).await
    }

    /// Create application state from explicit discovery and control implementations
    pub async fn with_parts(
        config: Config,
        discovery: Arc<dyn Discovery>,
        connector: Arc<dyn DeviceConnector>,
    ) -> Result<Arc<Self>> {
        let catalog = Arc::new(DeviceCatalog::new(
            config.catalog.path.clone(),
            config.catalog.reload,
        ));
        let locations = Arc::new(LocationCache::new());

        // The daemon does not start without a readable catalog
        let initial = catalog.load().await.with_context(|| {
            format!("Failed to load device catalog {}", catalog.path().display())
        })?;

        if config.catalog.seed_locations {
            let seeded = locations.seed(&initial).await;
            info!(devices = initial.len(), seeded = seeded, "Seeded device locations from catalog");
        }

        let scanner = Arc::new(ScanCoordinator::new(
            discovery,
            catalog.clone(),
            locations.clone(),
        ));
        let resolver = Resolver::new(catalog, locations);

        Ok(Arc::new(Self {
            scanner,
            resolver,
            connector,
            config,
        }))
    }

    /// How long a single scan listens
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.config.scan.timeout_secs)
    }

    /// Upper bound for one device-control call
    pub fn control_timeout(&self) -> Duration {
        Duration::from_secs(self.config.client.timeout_secs)
    }
}
