//! Device status payloads

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Data point holding the outlet's main switch state
pub const SWITCH_DPS: &str = "1";

/// Raw status document reported by a device, e.g.
/// `{"devId": "...", "dps": {"1": true, "9": 0}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusPayload(pub Value);

impl StatusPayload {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Value of a data point, if reported
    pub fn dps(&self, key: &str) -> Option<&Value> {
        self.0.get("dps").and_then(|dps| dps.get(key))
    }

    /// Whether the main switch reads as on
    pub fn is_on(&self) -> bool {
        self.dps(SWITCH_DPS).is_some_and(truthy)
    }

    /// Error message embedded in the payload by the device or client
    pub fn error(&self) -> Option<String> {
        match self.0.get("Error")? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

/// Truthiness of a data point value: false, 0, "", [], {} and null are off
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_switch_state() {
        assert!(StatusPayload::new(json!({"dps": {"1": true}})).is_on());
        assert!(!StatusPayload::new(json!({"dps": {"1": false}})).is_on());
        assert!(StatusPayload::new(json!({"dps": {"1": 1}})).is_on());
        assert!(!StatusPayload::new(json!({"dps": {"1": 0}})).is_on());
        assert!(!StatusPayload::new(json!({"dps": {"1": ""}})).is_on());
        assert!(!StatusPayload::new(json!({"dps": {"9": true}})).is_on());
        assert!(!StatusPayload::new(json!({})).is_on());
    }

    #[test]
    fn test_embedded_error() {
        let payload = StatusPayload::new(json!({"Error": "Network Error: Device Unreachable", "Err": "905"}));
        assert_eq!(payload.error().as_deref(), Some("Network Error: Device Unreachable"));
        assert_eq!(StatusPayload::new(json!({"dps": {"1": true}})).error(), None);
    }
}
