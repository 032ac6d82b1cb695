//! State-change decoding and notification fan-out
//!
//! One physical device can back several logical entities, so each
//! decoded delta is fanned out to one or more notification keys: relay
//! banks emit per index, constant-temperature panels expose heating and
//! fan views, metering devices expose voltage/current/energy views.
//! Deltas that match no known shape are re-queried from the hub rather
//! than dropped.

use super::{coerce_i64, Gateway};
use crate::config::DEVICE_COUNT_MAX;
use crate::protocol::event::{
    self, DeviceEvent, DEV_TYPE_INPUT_PANEL, DEV_TYPE_METERING, DEV_TYPE_SENSOR,
    DEV_TYPE_TEMP_PANEL, INPUT_CHANNELS,
};
use crate::protocol::{self};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

impl Gateway {
    /// Per-device state-change batch (event/3)
    ///
    /// Deltas carrying a lighting or passthrough field fan out
    /// directly; everything else is collected for a follow-up device
    /// query. A lighting change (or any non-housekeeping capability
    /// change) schedules a deferred group resync so aggregate state
    /// catches up.
    pub(crate) async fn handle_device_events(&self, data: Value) {
        let Some(states) = data.as_array() else {
            warn!("device event payload is not an array");
            return;
        };

        let mut group_dirty = false;
        let mut refetch: Vec<String> = Vec::new();

        for state in states {
            let Some(payload) = state.as_object() else { continue };

            if event::has_light_field(payload) {
                group_dirty = true;
                self.fan_out(payload).await;
            } else if event::has_passthrough_field(payload) {
                self.fan_out(payload).await;
            } else if let Some(sn) = payload.get("sn").and_then(Value::as_str) {
                refetch.push(sn.to_string());
            }

            if event::has_non_housekeeping_change(payload) {
                group_dirty = true;
            }
        }

        if !refetch.is_empty() {
            debug!("re-fetching {} devices with unrecognized deltas", refetch.len());
            let addr = self.config.read().await.mqtt_addr;
            let request = json!({
                "start": 0,
                "max": DEVICE_COUNT_MAX,
                "sns": refetch,
            });
            if let Err(err) = self
                .publish_request(
                    &protocol::request_topic(addr, "q5"),
                    request,
                    super::discovery::SEQ_REFETCH,
                )
                .await
            {
                warn!("device re-fetch request failed: {err}");
            }
        }

        if group_dirty {
            let gateway = self.clone();
            tokio::spawn(async move {
                if let Err(err) = gateway.sync_group_status(false).await {
                    warn!("deferred group resync failed: {err}");
                }
            });
        }
    }

    /// Fan one decoded delta out to its notification keys
    ///
    /// Every delta that carries a serial produces at least one
    /// notification; nothing is silently dropped here.
    pub(crate) async fn fan_out(&self, payload: &Map<String, Value>) {
        let Some(event) = DeviceEvent::classify(payload) else {
            warn!("state delta without serial number dropped");
            return;
        };

        match event {
            DeviceEvent::Relays { sn, relays, .. } => {
                for (index, relay) in relays.iter().enumerate() {
                    let on = coerce_i64(relay).unwrap_or(0) != 0;
                    self.notify_state(format!("switch:{sn}:{index}"), json!({ "on": on }))
                        .await;
                }
            }
            DeviceEvent::Typed {
                sn,
                dev_type,
                payload,
            } => {
                self.capture_reference_reading(&sn, &payload).await;
                match dev_type {
                    DEV_TYPE_TEMP_PANEL => {
                        let payload = self.correct_temp_reading(payload).await;
                        self.emit_views(&sn, &payload, &["", "H", "F"]).await;
                    }
                    DEV_TYPE_INPUT_PANEL => {
                        let value = Value::Object(payload);
                        for channel in INPUT_CHANNELS {
                            self.notify_state(format!("{sn}_{channel}"), value.clone())
                                .await;
                        }
                    }
                    DEV_TYPE_SENSOR => {
                        self.emit_views(&sn, &payload, &["L", "M"]).await;
                    }
                    DEV_TYPE_METERING => {
                        self.emit_views(&sn, &payload, &["", "V", "C", "E"]).await;
                    }
                    _ => {
                        self.notify_state(sn, Value::Object(payload)).await;
                    }
                }
            }
            DeviceEvent::MultiZone { sn, payload } => {
                // Legacy multi-zone deltas expose the same three views
                // as a type-9 panel
                self.emit_views(&sn, &payload, &["", "H", "F"]).await;
            }
            DeviceEvent::Presence { sn, payload } => {
                self.emit_views(&sn, &payload, &["L", "M"]).await;
            }
            DeviceEvent::Generic { sn, payload } => {
                self.notify_state(sn, Value::Object(payload)).await;
            }
        }
    }

    async fn emit_views(&self, sn: &str, payload: &Map<String, Value>, suffixes: &[&str]) {
        let value = Value::Object(payload.clone());
        for suffix in suffixes {
            self.notify_state(format!("{sn}{suffix}"), value.clone())
                .await;
        }
    }

    /// Cache the reference panel's raw `a19` sub-reading; any typed
    /// delta from that serial updates it
    async fn capture_reference_reading(&self, sn: &str, payload: &Map<String, Value>) {
        let reference_sn = self.config.read().await.temp_reference_sn.clone();
        if sn != reference_sn {
            return;
        }
        if let Some(reading) = payload.get("a19").and_then(coerce_i64) {
            self.session.lock().await.temp_offset = Some(reading);
        }
    }

    /// Cross-device temperature correction for type-9 panels
    ///
    /// The cached reference reading overrides what the panel reports;
    /// until the reference has reported once, a fixed -9 offset on the
    /// panel's own reading is used instead.
    async fn correct_temp_reading(&self, mut payload: Map<String, Value>) -> Map<String, Value> {
        let cached = self.session.lock().await.temp_offset;
        let corrected = match cached {
            Some(reference) => Some(reference),
            None => payload.get("a19").and_then(coerce_i64).map(|own| own - 9),
        };
        if let Some(corrected) = corrected {
            payload.insert("a19".into(), json!(corrected));
        }
        payload
    }
}
