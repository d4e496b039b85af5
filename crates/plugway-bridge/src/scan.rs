//! LAN scan through the bridge helper

use plugway_core::{DeviceId, DiscoveredDevice};
use serde_json::Value;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, info};

use crate::transport::{BridgeError, BridgeTransport};

impl BridgeTransport {
    /// Listen for device broadcasts for `timeout` and return what responded
    pub async fn scan(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, BridgeError> {
        let secs = whole_seconds(timeout);
        info!(timeout_secs = secs, "Running bridge scan");
        let stdout = self
            .invoke("scan", &[("timeout", secs.to_string())], &[])
            .await?;
        parse_scan_output(&stdout)
    }
}

/// Seconds to pass to the helper, rounded up and never zero
fn whole_seconds(timeout: Duration) -> u64 {
    let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
    secs.max(1)
}

/// Parse scan output into discovered devices
///
/// Accepts either a JSON array of `{"id", "ip"}` records, or an object whose
/// values are such records (as keyed-by-address scan dumps are). Records
/// without a usable id or address are skipped.
fn parse_scan_output(stdout: &[u8]) -> Result<Vec<DiscoveredDevice>, BridgeError> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let value: Value =
        serde_json::from_slice(stdout).map_err(|e| BridgeError::InvalidOutput(e.to_string()))?;

    let records: Vec<&Value> = match &value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        other => {
            return Err(BridgeError::InvalidOutput(format!(
                "scan output must be an array or object, got {}",
                other
            )))
        }
    };

    let devices: Vec<DiscoveredDevice> = records.into_iter().filter_map(parse_record).collect();
    debug!(count = devices.len(), "Parsed scan output");
    Ok(devices)
}

fn parse_record(record: &Value) -> Option<DiscoveredDevice> {
    let id = record
        .get("id")
        .or_else(|| record.get("gwId"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty());
    let ip = record
        .get("ip")
        .and_then(Value::as_str)
        .and_then(|ip| ip.parse::<IpAddr>().ok());

    match (id, ip) {
        (Some(id), Some(ip)) => Some(DiscoveredDevice {
            id: DeviceId::new(id),
            ip,
        }),
        _ => {
            debug!(record = %record, "Skipping scan record without id or address");
            None
        }
    }
}
