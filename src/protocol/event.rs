//! Decoding of per-device state-change payloads
//!
//! The hub reports state deltas as loosely-shaped JSON objects; which
//! logical entities a delta addresses depends on which fields it
//! carries. The shapes are resolved once here into a closed
//! [`DeviceEvent`] variant instead of being re-probed at every call
//! site. Every shape carries a serial number; payloads without one are
//! undecodable and dropped by the caller.

use serde_json::{Map, Value};

/// Fields that mark a lighting state delta
pub const LIGHT_FIELDS: [&str; 4] = ["on", "rgb", "level", "kelvin"];

/// Fields that are fanned out as-is without a re-query
pub const PASSTHROUGH_FIELDS: [&str; 4] = ["a109", "a15", "travel", "relays"];

/// Housekeeping fields that alone do not indicate a capability change
pub const HOUSEKEEPING_FIELDS: [&str; 3] = ["sn", "workingTime", "powerSavings"];

/// Fixed channel schema of the 4-channel input panel (type 16)
pub const INPUT_CHANNELS: [&str; 4] = ["a100", "a101", "a102", "a103"];

/// Device-type code of the constant-temperature control panel
pub const DEV_TYPE_TEMP_PANEL: i64 = 9;

/// Device-type code of the 4-channel input panel
pub const DEV_TYPE_INPUT_PANEL: i64 = 16;

/// Device-type code of the multi-capability sensor
pub const DEV_TYPE_SENSOR: i64 = 7;

/// Device-type code of the power-metering device
pub const DEV_TYPE_METERING: i64 = 20;

/// A decoded state-change payload
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// Relay-bank delta: one notification per relay index
    Relays {
        sn: String,
        relays: Vec<Value>,
        payload: Map<String, Value>,
    },
    /// Delta tagged with an explicit device-type code
    Typed {
        sn: String,
        dev_type: i64,
        payload: Map<String, Value>,
    },
    /// Legacy multi-zone delta (`a109` marker, no device-type tag);
    /// handled like a constant-temperature panel
    MultiZone {
        sn: String,
        payload: Map<String, Value>,
    },
    /// Presence/contact delta (`a15` marker)
    Presence {
        sn: String,
        payload: Map<String, Value>,
    },
    /// Anything else: a single notification keyed by the serial
    Generic {
        sn: String,
        payload: Map<String, Value>,
    },
}

impl DeviceEvent {
    /// Resolve a raw payload into its shape, `None` when no serial
    /// number is present
    pub fn classify(payload: &Map<String, Value>) -> Option<DeviceEvent> {
        let sn = payload.get("sn")?.as_str()?.to_string();
        let payload = payload.clone();

        if let Some(relays) = payload.get("relays").and_then(Value::as_array) {
            return Some(DeviceEvent::Relays {
                sn,
                relays: relays.clone(),
                payload,
            });
        }

        if let Some(dev_type) = payload.get("devType").and_then(Value::as_i64) {
            return Some(DeviceEvent::Typed {
                sn,
                dev_type,
                payload,
            });
        }

        if payload.contains_key("a109") {
            return Some(DeviceEvent::MultiZone { sn, payload });
        }

        if payload.contains_key("a15") {
            return Some(DeviceEvent::Presence { sn, payload });
        }

        Some(DeviceEvent::Generic { sn, payload })
    }

    /// Serial number of the originating device
    pub fn sn(&self) -> &str {
        match self {
            DeviceEvent::Relays { sn, .. }
            | DeviceEvent::Typed { sn, .. }
            | DeviceEvent::MultiZone { sn, .. }
            | DeviceEvent::Presence { sn, .. }
            | DeviceEvent::Generic { sn, .. } => sn,
        }
    }
}

/// Whether the delta carries a lighting field
pub fn has_light_field(payload: &Map<String, Value>) -> bool {
    LIGHT_FIELDS.iter().any(|f| payload.contains_key(*f))
}

/// Whether the delta carries a field that is fanned out without a
/// follow-up device query
pub fn has_passthrough_field(payload: &Map<String, Value>) -> bool {
    PASSTHROUGH_FIELDS.iter().any(|f| payload.contains_key(*f))
}

/// Whether a delta that reports working-time/power counters also
/// carries something beyond housekeeping, i.e. a real capability change
pub fn has_non_housekeeping_change(payload: &Map<String, Value>) -> bool {
    if !payload.contains_key("workingTime") && !payload.contains_key("powerSavings") {
        return false;
    }
    payload
        .keys()
        .any(|key| !HOUSEKEEPING_FIELDS.contains(&key.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn relays_take_precedence_over_dev_type() {
        let event =
            DeviceEvent::classify(&map(json!({"sn": "S1", "devType": 2, "relays": [1, 0]})))
                .unwrap();
        assert!(matches!(event, DeviceEvent::Relays { ref relays, .. } if relays.len() == 2));
    }

    #[test]
    fn typed_before_markers() {
        let event =
            DeviceEvent::classify(&map(json!({"sn": "S1", "devType": 9, "a109": 1}))).unwrap();
        assert!(matches!(event, DeviceEvent::Typed { dev_type: 9, .. }));
    }

    #[test]
    fn marker_fallbacks() {
        assert!(matches!(
            DeviceEvent::classify(&map(json!({"sn": "S1", "a109": 2}))).unwrap(),
            DeviceEvent::MultiZone { .. }
        ));
        assert!(matches!(
            DeviceEvent::classify(&map(json!({"sn": "S1", "a15": 0}))).unwrap(),
            DeviceEvent::Presence { .. }
        ));
        assert!(matches!(
            DeviceEvent::classify(&map(json!({"sn": "S1", "battery": 80}))).unwrap(),
            DeviceEvent::Generic { .. }
        ));
    }

    #[test]
    fn missing_serial_is_undecodable() {
        assert!(DeviceEvent::classify(&map(json!({"devType": 9}))).is_none());
    }

    #[test]
    fn housekeeping_only_is_not_a_change() {
        assert!(!has_non_housekeeping_change(&map(
            json!({"sn": "S1", "workingTime": 120})
        )));
        assert!(has_non_housekeeping_change(&map(
            json!({"sn": "S1", "workingTime": 120, "a14": 3})
        )));
        assert!(!has_non_housekeeping_change(&map(json!({"sn": "S1"}))));
    }
}
