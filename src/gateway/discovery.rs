//! Staged, paginated inventory discovery
//!
//! After (re)connection the gateway walks a fixed handshake: basic data
//! (rooms/subgroups), the type-filtered device list, scenes, automation
//! tasks, the optional group snapshot, and finally a serial-filtered
//! re-query for devices that arrived without their composite
//! attributes. Stages are paced by fixed settle delays because the hub
//! correlates responses only through the echoed `seq` tag; pagination
//! advances when a page reports `start + count < total`.

use super::{coerce_i64, EntityCategory, Gateway};
use crate::config::{LightControlMode, DEVICE_COUNT_MAX, DISCOVERY_DEV_TYPES};
use crate::error::{GatewayError, Result};
use crate::protocol::{self, ResponseEnvelope};
use serde_json::{json, Value};
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Sequence tag of the type-filtered device pass
pub const SEQ_TYPE_FILTERED: i64 = 1;

/// Sequence tag of the deferred serial-filtered pass
pub const SEQ_SN_FILTERED: i64 = 2;

/// Sequence tag of event-driven device re-queries
pub const SEQ_REFETCH: i64 = 3;

impl Gateway {
    /// Topics subscribed for the lifetime of the session
    async fn discovery_topics(&self) -> Vec<String> {
        let config = self.config.read().await;
        let addr = config.mqtt_addr;
        let event_addr = config.event_addr();
        vec![
            protocol::response_topic(addr, "p5"),
            protocol::response_topic(addr, "p28"),
            protocol::response_topic(addr, "p33"),
            protocol::response_topic(addr, "p71"),
            protocol::response_topic(addr, "p55"),
            protocol::response_topic(addr, "p82"),
            format!("p/{event_addr}/event/3"),
            format!("p/{event_addr}/event/4"),
            format!("p/{event_addr}/event/5"),
            format!("p/{addr}/report/q5"),
            format!("p/{addr}/report/q7"),
        ]
    }

    /// Run the discovery handshake
    ///
    /// `is_init` marks the first run of a session; re-entrant runs
    /// within the debounce window are suppressed so a flapping
    /// connection does not trigger a rediscovery storm. Group-only
    /// resyncs go through [`sync_group_status`](Self::sync_group_status)
    /// and bypass this debounce.
    pub async fn init(&self, is_init: bool) -> Result<()> {
        // The transport may still be handshaking right after reconnect
        let mut tries = 3u8;
        while !self.transport.is_connected() {
            sleep(Duration::from_secs(1)).await;
            tries -= 1;
            if tries == 0 {
                break;
            }
        }

        if !self.transport.is_connected() {
            warn!("transport not connected, leaving recovery to the monitor");
            return Err(GatewayError::connection("transport not connected"));
        }

        let debounce = self.config.read().await.monitor.init_debounce;
        {
            let mut session = self.session.lock().await;
            let now = Instant::now();
            if !is_init {
                if let Some(last) = session.last_init {
                    if now.duration_since(last) < debounce {
                        debug!("init suppressed inside debounce window");
                        return Ok(());
                    }
                }
            }
            session.last_init = Some(now);
            session.init_state = true;
            session.deferred_sns.clear();
        }

        let result = self.run_discovery(is_init).await;
        if let Err(ref err) = result {
            warn!("discovery sequence aborted: {err}");
            self.session.lock().await.init_state = false;
        }
        result
    }

    async fn run_discovery(&self, is_init: bool) -> Result<()> {
        let (addr, pacing, light_mode) = {
            let config = self.config.read().await;
            (config.mqtt_addr, config.pacing.clone(), config.light_mode)
        };

        if is_init {
            for topic in self.discovery_topics().await {
                self.transport.subscribe(&topic).await?;
            }
        }

        info!("starting inventory discovery (init: {is_init})");

        // Rooms and subgroups first, the rest resolves names against them
        self.publish_request(&protocol::request_topic(addr, "q33"), json!({}), 2)
            .await?;
        sleep(pacing.after_basic).await;

        self.publish_request(
            &protocol::request_topic(addr, "q5"),
            device_query_by_types(0),
            SEQ_TYPE_FILTERED,
        )
        .await?;
        sleep(pacing.after_devices).await;

        self.publish_request(&protocol::request_topic(addr, "q28"), json!({}), 2)
            .await?;
        sleep(pacing.after_scenes).await;

        self.publish_request(&protocol::request_topic(addr, "q71"), json!({}), 2)
            .await?;

        if light_mode == LightControlMode::Group {
            sleep(pacing.before_group_snapshot).await;
            self.sync_group_status(true).await?;
        }

        sleep(pacing.before_deferred).await;

        let deferred = self.session.lock().await.deferred_sns.clone();
        if !deferred.is_empty() {
            info!("re-querying {} attribute-incomplete devices", deferred.len());
            self.publish_request(
                &protocol::request_topic(addr, "q5"),
                device_query_by_sns(0, &deferred),
                SEQ_SN_FILTERED,
            )
            .await?;
        }

        Ok(())
    }

    /// Device-list page (p5), routed by the echoed sequence tag
    pub(crate) async fn handle_device_list(&self, envelope: ResponseEnvelope) {
        let page: protocol::Page = match serde_json::from_value(envelope.data) {
            Ok(page) => page,
            Err(err) => {
                warn!("malformed device-list page: {err}");
                return;
            }
        };

        match envelope.seq {
            SEQ_TYPE_FILTERED => {
                self.register_devices(&page.list).await;
                if page.has_more() {
                    self.request_next_page(device_query_by_types(page.next_start()), envelope.seq)
                        .await;
                }
            }
            SEQ_SN_FILTERED => {
                self.register_devices(&page.list).await;
                if page.has_more() {
                    let deferred = self.session.lock().await.deferred_sns.clone();
                    self.request_next_page(
                        device_query_by_sns(page.next_start(), &deferred),
                        envelope.seq,
                    )
                    .await;
                }
            }
            SEQ_REFETCH => {
                // Refetched records flow through the regular fan-out
                for device in &page.list {
                    if let Some(obj) = device.as_object() {
                        self.fan_out(obj).await;
                    }
                }
            }
            other => debug!("device-list page with unhandled seq {other}"),
        }
    }

    async fn request_next_page(&self, data: Value, seq: i64) {
        let addr = self.config.read().await.mqtt_addr;
        if let Err(err) = self
            .publish_request(&protocol::request_topic(addr, "q5"), data, seq)
            .await
        {
            warn!("device-list follow-up request failed: {err}");
        }
    }

    /// Classify and register one page of discovered devices
    ///
    /// A device with status 0 is skipped entirely. A switch that
    /// arrived without its relay descriptors is deferred to the
    /// serial-filtered pass instead of being registered half-formed.
    pub(crate) async fn register_devices(&self, list: &[Value]) {
        let light_mode = self.config.read().await.light_mode;

        for device in list {
            let Some(obj) = device.as_object() else { continue };
            let Some(sn) = obj.get("sn").and_then(Value::as_str).map(String::from) else {
                warn!("discovered device without serial, skipping");
                continue;
            };
            let Some(dev_type) = obj.get("devType").and_then(coerce_i64) else {
                continue;
            };

            let state = obj.get("state").and_then(coerce_i64).unwrap_or(0);
            if state == 0 {
                continue;
            }

            let mut device = obj.clone();
            device.insert("unique_id".into(), Value::String(sn.clone()));

            match dev_type {
                3 => {
                    self.notify_discovered(EntityCategory::Cover, Value::Object(device.clone()))
                        .await;
                }
                1 if light_mode == LightControlMode::Single => {
                    device.insert("is_group".into(), Value::Bool(false));
                    self.notify_discovered(EntityCategory::Button, Value::Object(device.clone()))
                        .await;
                    self.notify_discovered(EntityCategory::Light, Value::Object(device.clone()))
                        .await;
                }
                11 => {
                    self.notify_discovered(EntityCategory::Climate, Value::Object(device.clone()))
                        .await;
                }
                4 => {
                    // Hub reboot control
                    self.notify_discovered(EntityCategory::Button, Value::Object(device.clone()))
                        .await;
                }
                7 => {
                    if device.contains_key("a121") {
                        self.notify_discovered(
                            EntityCategory::Switch,
                            Value::Object(device.clone()),
                        )
                        .await;
                    }
                    if device.contains_key("a14") {
                        self.notify_discovered(
                            EntityCategory::Sensor,
                            Value::Object(device.clone()),
                        )
                        .await;
                    }
                    if device.contains_key("a15") {
                        self.notify_discovered(
                            EntityCategory::BinarySensor,
                            Value::Object(device.clone()),
                        )
                        .await;
                    }
                }
                16 => {
                    if device.contains_key("a99") {
                        self.notify_discovered(
                            EntityCategory::BinarySensor,
                            Value::Object(device.clone()),
                        )
                        .await;
                    }
                }
                20 => {
                    if device.contains_key("a41") {
                        self.notify_discovered(
                            EntityCategory::Switch,
                            Value::Object(device.clone()),
                        )
                        .await;
                    }
                    if device.contains_key("a155") && device.contains_key("a158") {
                        self.notify_discovered(
                            EntityCategory::Sensor,
                            Value::Object(device.clone()),
                        )
                        .await;
                    }
                }
                9 => {
                    // Constant-temperature panel: sub-flags select the
                    // exposed capabilities
                    let a110 = device.get("a110").and_then(coerce_i64).unwrap_or(0);
                    let a111 = device.get("a111").and_then(coerce_i64).unwrap_or(0);
                    let a112 = device.get("a112").and_then(coerce_i64).unwrap_or(0);
                    if a110 == 1 || a110 == 2 || a111 == 1 {
                        self.notify_discovered(
                            EntityCategory::Climate,
                            Value::Object(device.clone()),
                        )
                        .await;
                    }
                    if a112 == 1 {
                        self.notify_discovered(EntityCategory::Fan, Value::Object(device.clone()))
                            .await;
                    }
                }
                2 => {
                    if device.contains_key("a15") {
                        self.notify_discovered(
                            EntityCategory::BinarySensor,
                            Value::Object(device.clone()),
                        )
                        .await;
                    }
                    if device.contains_key("relays")
                        && device.contains_key("relaysNames")
                        && device.contains_key("relaysNum")
                    {
                        self.notify_discovered(
                            EntityCategory::Switch,
                            Value::Object(device.clone()),
                        )
                        .await;
                    } else {
                        let mut session = self.session.lock().await;
                        if !session.deferred_sns.contains(&sn) {
                            session.deferred_sns.push(sn.clone());
                        }
                    }
                }
                5 => {
                    // Asynchronous metadata responses reference only a
                    // process-local handle; assign it exactly once
                    let handle = {
                        let mut session = self.session.lock().await;
                        if session.media_handles.contains_key(&sn) {
                            None
                        } else {
                            let handle = session.next_media_handle;
                            session.next_media_handle += 1;
                            session.media_handles.insert(sn.clone(), handle);
                            Some(handle)
                        }
                    };
                    if let Some(handle) = handle {
                        device.insert("num".into(), json!(handle));
                        self.notify_discovered(
                            EntityCategory::MediaPlayer,
                            Value::Object(device.clone()),
                        )
                        .await;
                    }
                }
                other => debug!("unclassified device type {other} for {sn}"),
            }

            let room = device.get("room").and_then(coerce_i64);
            let subgroup = device.get("subgroup").and_then(coerce_i64);

            let mut session = self.session.lock().await;
            if let (Some(room), Some(subgroup)) = (room, subgroup) {
                session.device_groups.insert(sn.clone(), (room, subgroup));
            }
            session.devices.insert(
                sn.clone(),
                super::DeviceRecord {
                    sn,
                    dev_type,
                    room,
                    subgroup,
                    attributes: device,
                },
            );
        }
    }
}

/// Page request filtered by the device-type allow-list
pub(crate) fn device_query_by_types(start: i64) -> Value {
    json!({
        "start": start,
        "max": DEVICE_COUNT_MAX,
        "devTypes": DISCOVERY_DEV_TYPES,
    })
}

/// Page request filtered by explicit serial numbers
pub(crate) fn device_query_by_sns(start: i64, sns: &[String]) -> Value {
    json!({
        "start": start,
        "max": DEVICE_COUNT_MAX,
        "sns": sns,
    })
}
