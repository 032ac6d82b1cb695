//! Light-group aggregation and resync
//!
//! Aggregate lighting state is keyed by the (room, subgroup) pair and
//! never persisted: every group snapshot page (p82) or group event
//! (event/5) recomputes the partial state and re-publishes it. Fields
//! absent from an update are simply omitted so downstream consumers
//! keep their previously known values.

use super::{coerce_f64, coerce_i64, EntityCategory, Gateway};
use crate::error::Result;
use crate::protocol::{self, ResponseEnvelope};
use serde_json::{json, Map, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

/// Sequence tag of the group-definition snapshot
const SEQ_GROUP_SNAPSHOT: i64 = 1;

/// Sequence tag of the periodic group-state resync
const SEQ_GROUP_RESYNC: i64 = 2;

impl Gateway {
    /// Group snapshot page (p82)
    ///
    /// seq 1 registers group entities; seq 2 emits aggregate state
    /// updates for the same keys.
    pub(crate) async fn handle_group_page(&self, envelope: ResponseEnvelope) {
        if envelope.seq != SEQ_GROUP_SNAPSHOT && envelope.seq != SEQ_GROUP_RESYNC {
            debug!("group page with unhandled seq {}", envelope.seq);
            return;
        }

        let Some(rows) = envelope.data.as_array() else {
            warn!("group page payload is not an array");
            return;
        };

        for row in rows {
            let Some(obj) = row.as_object() else { continue };
            if !obj.contains_key("a7") {
                continue;
            }
            let (Some(room_id), Some(group_id)) = (
                obj.get("a8").and_then(coerce_i64),
                obj.get("a9").and_then(coerce_i64),
            ) else {
                continue;
            };

            let mut lights = Map::new();
            if let Some(on) = obj.get("a10") {
                lights.insert("on".into(), on.clone());
            }
            if let Some(level) = obj.get("a11") {
                lights.insert("level".into(), level.clone());
            }
            if let Some(kelvin) = obj.get("a12") {
                lights.insert("kelvin".into(), kelvin.clone());
            }
            if let Some(rgb) = obj.get("a13") {
                lights.insert("rgb".into(), rgb.clone());
            }

            if envelope.seq == SEQ_GROUP_SNAPSHOT {
                self.register_group(room_id, group_id, lights).await;
            } else {
                self.emit_group_state(room_id, group_id, &lights).await;
            }
        }
    }

    /// Group state-change stream (event/5); only lighting groups
    /// (device type 1) are aggregated
    pub(crate) async fn handle_group_events(&self, data: Value) {
        let Some(rows) = data.as_array() else {
            warn!("group event payload is not an array");
            return;
        };

        for row in rows {
            let Some(obj) = row.as_object() else { continue };
            let (Some(device_type), Some(room_id), Some(group_id)) = (
                obj.get("a7").and_then(coerce_i64),
                obj.get("a8").and_then(coerce_i64),
                obj.get("a9").and_then(coerce_i64),
            ) else {
                continue;
            };
            if device_type != 1 {
                continue;
            }

            let mut update = Map::new();
            if let Some(on) = obj.get("a10") {
                update.insert("on".into(), on.clone());
            }
            if let Some(level) = obj.get("a11") {
                update.insert("level".into(), level.clone());
            }
            if let Some(kelvin) = obj.get("a12") {
                update.insert("kelvin".into(), kelvin.clone());
            }
            if let Some(rgb) = obj.get("a13") {
                if coerce_i64(rgb).unwrap_or(0) != 0 {
                    update.insert("rgb".into(), rgb.clone());
                }
            }

            if !update.is_empty() {
                self.emit_group_state(room_id, group_id, &update).await;
            }
        }
    }

    /// Register a group entity keyed `room-subgroup`, merging static
    /// snapshot fields with the current dynamic state
    async fn register_group(&self, room_id: i64, group_id: i64, lights: Map<String, Value>) {
        let (room_name, group_name) = {
            let session = self.session.lock().await;
            (session.room_name(room_id), session.subgroup_name(group_id))
        };

        let mut group = lights;
        group.insert(
            "unique_id".into(),
            Value::String(format!("{room_id}-{group_id}")),
        );
        group.insert("room".into(), json!(room_id));
        group.insert("subgroup".into(), json!(group_id));
        group.insert("is_group".into(), Value::Bool(true));
        group.insert(
            "name".into(),
            Value::String(format!("{room_name}-{group_name}")),
        );

        self.notify_discovered(EntityCategory::Light, Value::Object(group))
            .await;
    }

    /// Emit an aggregate-state notification for `room-subgroup`,
    /// carrying only the fields present in this update
    pub(crate) async fn emit_group_state(
        &self,
        room_id: i64,
        group_id: i64,
        update: &Map<String, Value>,
    ) {
        let mut state = Map::new();
        if let Some(on) = update.get("on").and_then(coerce_i64) {
            state.insert("on".into(), json!(on));
        }
        if let Some(level) = update.get("level").and_then(coerce_f64) {
            state.insert("level".into(), json!(level));
        }
        if let Some(kelvin) = update.get("kelvin").and_then(coerce_i64) {
            state.insert("kelvin".into(), json!(kelvin));
        }
        if let Some(rgb) = update.get("rgb").and_then(coerce_i64) {
            state.insert("rgb".into(), json!(rgb));
        }

        self.notify_state(format!("{room_id}-{group_id}"), Value::Object(state))
            .await;
    }

    /// Request a consistent group snapshot from the hub
    ///
    /// The initial request goes out immediately (seq 1); a periodic
    /// resync first waits out the configured delay so in-flight
    /// device-level events settle, then requests with seq 2.
    pub async fn sync_group_status(&self, is_init: bool) -> Result<()> {
        let (addr, resync_delay) = {
            let config = self.config.read().await;
            (config.mqtt_addr, config.pacing.group_resync_delay)
        };
        let data = json!([{ "a7": 1 }]);
        let topic = protocol::request_topic(addr, "q82");

        if is_init {
            self.publish_request(&topic, data, SEQ_GROUP_SNAPSHOT).await
        } else {
            sleep(resync_delay).await;
            self.publish_request(&topic, data, SEQ_GROUP_RESYNC).await
        }
    }
}
