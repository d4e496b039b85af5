//! Device registry: the reloadable catalog and the location cache

use plugway_core::{Catalog, CatalogError, DeviceId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// When the catalog file is re-read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReloadPolicy {
    /// Re-read the file on every load
    #[default]
    Always,
    /// Re-read only when the file's modification time or size changed
    OnChange,
}

/// Modification time and size of the catalog file at a given load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok()?,
            len: meta.len(),
        })
    }
}

#[derive(Default)]
struct CatalogState {
    catalog: Option<Arc<Catalog>>,
    stamp: Option<FileStamp>,
}

/// The device catalog backed by a JSON file, reloadable at any time
///
/// A successful load replaces the in-memory catalog wholesale. A failed
/// load leaves the previous catalog in place and returns the error.
pub struct DeviceCatalog {
    path: PathBuf,
    policy: ReloadPolicy,
    state: RwLock<CatalogState>,
}

impl DeviceCatalog {
    pub fn new(path: impl Into<PathBuf>, policy: ReloadPolicy) -> Self {
        Self {
            path: path.into(),
            policy,
            state: RwLock::new(CatalogState::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the catalog from disk, replacing the in-memory copy
    pub async fn load(&self) -> Result<Arc<Catalog>, CatalogError> {
        let stamp = FileStamp::of(&self.path);

        if self.policy == ReloadPolicy::OnChange && stamp.is_some() {
            let state = self.state.read().await;
            if let Some(catalog) = state.catalog.as_ref().filter(|_| state.stamp == stamp) {
                debug!(path = %self.path.display(), "Catalog unchanged, reusing");
                return Ok(catalog.clone());
            }
        }

        let catalog = match Catalog::from_file(&self.path) {
            Ok(catalog) => Arc::new(catalog),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to load device catalog, keeping previous");
                return Err(e);
            }
        };

        let mut state = self.state.write().await;
        if state.catalog.as_deref() != Some(&*catalog) {
            info!(path = %self.path.display(), devices = catalog.len(), "Loaded device catalog");
        }
        state.catalog = Some(catalog.clone());
        state.stamp = stamp;
        Ok(catalog)
    }

    /// The most recently loaded catalog, if any load has succeeded
    pub async fn current(&self) -> Option<Arc<Catalog>> {
        self.state.read().await.catalog.clone()
    }
}

/// Last known address of every located device
///
/// Entries are only ever overwritten, never expired: an address is
/// trusted until a later scan reports a different one.
#[derive(Debug, Default)]
pub struct LocationCache {
    locations: RwLock<HashMap<DeviceId, IpAddr>>,
}

impl LocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current address of a device
    pub async fn get(&self, id: &str) -> Option<IpAddr> {
        self.locations.read().await.get(id).copied()
    }

    /// Record an address, returning the one it replaced
    pub async fn put(&self, id: DeviceId, ip: IpAddr) -> Option<IpAddr> {
        self.locations.write().await.insert(id, ip)
    }

    /// Record several addresses under a single lock
    pub async fn merge(&self, records: impl IntoIterator<Item = (DeviceId, IpAddr)>) {
        let mut locations = self.locations.write().await;
        for (id, ip) in records {
            if let Some(previous) = locations.insert(id.clone(), ip) {
                if previous != ip {
                    info!(device = %id, old_ip = %previous, new_ip = %ip, "Device moved");
                }
            } else {
                info!(device = %id, ip = %ip, "Device located");
            }
        }
    }

    /// Seed addresses declared in the catalog file
    pub async fn seed(&self, catalog: &Catalog) -> usize {
        let seeds: Vec<(DeviceId, IpAddr)> = catalog
            .iter()
            .filter_map(|(id, entry)| {
                let raw = entry.ip.as_deref()?;
                match entry.seed_ip() {
                    Some(ip) => Some((id.clone(), ip)),
                    None => {
                        warn!(device = %id, ip = raw, "Ignoring catalog address that is not an IP");
                        None
                    }
                }
            })
            .collect();
        let count = seeds.len();

        let mut locations = self.locations.write().await;
        for (id, ip) in seeds {
            locations.entry(id).or_insert(ip);
        }
        count
    }

    /// Copy of all known locations
    pub async fn snapshot(&self) -> BTreeMap<DeviceId, IpAddr> {
        self.locations
            .read()
            .await
            .iter()
            .map(|(id, ip)| (id.clone(), *ip))
            .collect()
    }
}
