//! Device catalog - the declared set of managed devices
//!
//! The catalog file is a JSON object mapping device ids to entries:
//!
//! ```json
//! {
//!   "bf0123456789abcdef": {
//!     "name": "lamp",
//!     "local_key": "0123456789abcdef",
//!     "version": "3.3",
//!     "ip": "192.168.1.40"
//!   }
//! }
//! ```
//!
//! `name`, `version` and `ip` are optional. Entries keep the order they
//! have in the file, which decides which entry wins a name lookup.

use serde::{Deserialize, Deserializer, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::device::{DeviceId, DEFAULT_PROTOCOL_VERSION};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read device catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse device catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Device catalog must be a JSON object mapping device ids to entries")]
    NotAnObject,
    #[error("Invalid catalog entry for device {id}: {source}")]
    InvalidEntry {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A single device declared in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Human-readable display name
    #[serde(default)]
    pub name: Option<String>,
    /// Local encryption key
    pub local_key: String,
    /// Device protocol version
    #[serde(default = "default_version", deserialize_with = "version_string")]
    pub version: String,
    /// Last known address as written in the file, only used to seed
    /// locations at startup
    #[serde(default, deserialize_with = "optional_ip", skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl CatalogEntry {
    /// The seed address, if it is a valid IP literal
    pub fn seed_ip(&self) -> Option<IpAddr> {
        self.ip.as_deref().and_then(|ip| ip.parse().ok())
    }
}

fn default_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_string()
}

/// Accept `"3.3"` as well as `3.3`
fn version_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Version {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Version::deserialize(deserializer)? {
        Version::Text(s) => s,
        Version::Number(n) => n.to_string(),
    })
}

/// Keep any non-blank string; anything else means "no address"
fn optional_ip<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    })
}

/// The full set of declared devices, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<(DeviceId, CatalogEntry)>,
}

impl Catalog {
    /// Create an empty catalog
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the catalog from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse the catalog from a JSON string
    pub fn from_json(content: &str) -> Result<Self, CatalogError> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        let serde_json::Value::Object(map) = value else {
            return Err(CatalogError::NotAnObject);
        };

        let mut entries = Vec::with_capacity(map.len());
        for (id, raw) in map {
            let entry: CatalogEntry = serde_json::from_value(raw)
                .map_err(|source| CatalogError::InvalidEntry { id: id.clone(), source })?;
            entries.push((DeviceId(id), entry));
        }

        Ok(Self { entries })
    }

    /// Look up an entry by device id
    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries
            .iter()
            .find(|(entry_id, _)| entry_id.as_str() == id)
            .map(|(_, entry)| entry)
    }

    /// Check whether a device id is declared
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Look up an entry by display name (exact, case-sensitive, first match wins)
    pub fn find_by_name(&self, name: &str) -> Option<(&DeviceId, &CatalogEntry)> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.name.as_deref() == Some(name))
            .map(|(id, entry)| (id, entry))
    }

    /// Resolve an identifier that may be a device id or a display name
    pub fn lookup(&self, identifier: &str) -> Option<(&DeviceId, &CatalogEntry)> {
        self.entries
            .iter()
            .find(|(id, _)| id.as_str() == identifier)
            .map(|(id, entry)| (id, entry))
            .or_else(|| self.find_by_name(identifier))
    }

    /// Iterate over entries in catalog order
    pub fn iter(&self) -> impl Iterator<Item = (&DeviceId, &CatalogEntry)> {
        self.entries.iter().map(|(id, entry)| (id, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
