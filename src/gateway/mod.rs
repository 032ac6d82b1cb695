//! Gateway session: inventory, inbound routing and the command surface
//!
//! One [`Gateway`] owns one place-controller session. All inbound
//! envelope processing and inventory mutation funnel through the
//! serialized session lock; the connection monitor and the transport
//! pump share the same handle and only invoke these entry points.
//! Downstream consumers receive [`GatewayNotification`] values over
//! per-subscriber channels keyed by the notification key scheme
//! described in the protocol module.

pub mod audit;
pub mod discovery;
pub mod events;
pub mod groups;

use crate::config::{ConnectionInfo, GatewayConfig};
use crate::error::Result;
use crate::protocol::{self, RequestEnvelope, ResponseEnvelope, TopicKind};
use crate::transport::MqttTransport;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Display label of the synthetic whole-premises room (id 0)
pub const WHOLE_PREMISES_LABEL: &str = "Whole premises";

/// Display label of the synthetic all-lights subgroup (id 0)
pub const ALL_LIGHTS_LABEL: &str = "All lights";

/// Placeholder when a room id cannot be resolved
pub const UNKNOWN_ROOM_LABEL: &str = "unknown room";

/// Placeholder when a subgroup id cannot be resolved
pub const UNKNOWN_SUBGROUP_LABEL: &str = "unknown light group";

/// First media-player correlation handle
const MEDIA_HANDLE_BASE: i64 = 10000;

/// Default sequence tag for ad-hoc command pushes
const CUSTOM_PUSH_SEQ: i64 = 4;

/// Entity categories the discovery dispatch can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityCategory {
    Light,
    Cover,
    Button,
    Climate,
    Fan,
    Switch,
    Sensor,
    BinarySensor,
    MediaPlayer,
    Scene,
}

impl std::fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EntityCategory::Light => "light",
            EntityCategory::Cover => "cover",
            EntityCategory::Button => "button",
            EntityCategory::Climate => "climate",
            EntityCategory::Fan => "fan",
            EntityCategory::Switch => "switch",
            EntityCategory::Sensor => "sensor",
            EntityCategory::BinarySensor => "binary_sensor",
            EntityCategory::MediaPlayer => "media_player",
            EntityCategory::Scene => "scene",
        };
        write!(f, "{name}")
    }
}

/// Fire-and-forget notification to the presentation layer
#[derive(Debug, Clone)]
pub enum GatewayNotification {
    /// A device (or group/scene) entity was discovered
    EntityDiscovered {
        category: EntityCategory,
        device: Value,
    },
    /// A logical entity's state changed; `state` carries only the
    /// fields present in this update
    StateChanged { key: String, state: Value },
    /// A free-form hub report arrived (report/q5, report/q7, custom
    /// diagnostic topics)
    ReportReceived { topic: String, payload: Value },
}

/// Room record from the basic-data snapshot
#[derive(Debug, Clone)]
pub struct Room {
    pub id: i64,
    pub name: String,
    pub icon: i64,
}

/// Light/curtain subgroup record from the basic-data snapshot
#[derive(Debug, Clone)]
pub struct Subgroup {
    pub id: i64,
    pub name: String,
}

/// Device record keyed by serial number; append-only for the session,
/// attributes last-write-wins
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub sn: String,
    pub dev_type: i64,
    pub room: Option<i64>,
    pub subgroup: Option<i64>,
    pub attributes: Map<String, Value>,
}

/// Serialized per-session state
#[derive(Debug, Default)]
pub(crate) struct Session {
    pub rooms: HashMap<i64, Room>,
    pub subgroups: HashMap<i64, Subgroup>,
    pub devices: HashMap<String, DeviceRecord>,
    pub scenes: HashMap<i64, String>,
    pub tasks: HashMap<i64, String>,
    /// sn → (room, subgroup) for devices that belong to a group
    pub device_groups: HashMap<String, (i64, i64)>,
    /// Serials deferred to the attribute-completion re-query
    pub deferred_sns: Vec<String>,
    /// Media-player serial → correlation handle
    pub media_handles: HashMap<String, i64>,
    pub next_media_handle: i64,
    /// Cached reference `a19` reading correcting type-9 panels
    pub temp_offset: Option<i64>,
    /// Whether the init sequence last completed
    pub init_state: bool,
    pub last_init: Option<Instant>,
    /// Custom diagnostic topics already subscribed
    pub custom_topics: HashSet<String>,
}

impl Session {
    fn new() -> Self {
        Self {
            next_media_handle: MEDIA_HANDLE_BASE,
            ..Default::default()
        }
    }

    pub(crate) fn room_name(&self, id: i64) -> String {
        self.rooms
            .get(&id)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| UNKNOWN_ROOM_LABEL.to_string())
    }

    pub(crate) fn subgroup_name(&self, id: i64) -> String {
        self.subgroups
            .get(&id)
            .map(|g| g.name.clone())
            .unwrap_or_else(|| UNKNOWN_SUBGROUP_LABEL.to_string())
    }
}

/// Gateway engine for one place-controller session
#[derive(Clone)]
pub struct Gateway {
    pub(crate) config: Arc<RwLock<GatewayConfig>>,
    pub(crate) transport: Arc<dyn MqttTransport>,
    pub(crate) session: Arc<Mutex<Session>>,
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<GatewayNotification>>>>,
}

impl Gateway {
    /// Create a gateway over the given transport
    pub fn new(config: GatewayConfig, transport: Arc<dyn MqttTransport>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            transport,
            session: Arc::new(Mutex::new(Session::new())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Subscribe to gateway notifications
    pub async fn subscribe_notifications(&self) -> mpsc::UnboundedReceiver<GatewayNotification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().await.push(tx);
        rx
    }

    /// Deliver a notification to all live subscribers
    pub(crate) async fn notify(&self, notification: GatewayNotification) {
        let mut subscribers = self.subscribers.lock().await;
        subscribers.retain(|tx| tx.send(notification.clone()).is_ok());
    }

    pub(crate) async fn notify_discovered(&self, category: EntityCategory, device: Value) {
        debug!("entity discovered: {} {}", category, device["sn"]);
        self.notify(GatewayNotification::EntityDiscovered { category, device })
            .await;
    }

    pub(crate) async fn notify_state(&self, key: impl Into<String>, state: Value) {
        self.notify(GatewayNotification::StateChanged {
            key: key.into(),
            state,
        })
        .await;
    }

    /// Whether the transport reports a live connection
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Whether the init sequence last ran to completion
    pub async fn init_state(&self) -> bool {
        self.session.lock().await.init_state
    }

    /// Apply new broker connection info and reconnect the transport
    pub async fn apply_connection(&self, info: &ConnectionInfo) -> Result<()> {
        if let Some(addr) = info.mqtt_addr {
            self.config.write().await.mqtt_addr = addr;
        }
        self.transport.reconnect(info).await
    }

    /// Disconnect the transport
    pub async fn disconnect(&self) -> Result<()> {
        self.transport.disconnect().await
    }

    /// Route one inbound transport message
    ///
    /// Malformed payloads are logged and dropped; unknown topic
    /// suffixes are ignored unless they were custom-subscribed.
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) {
        if payload.is_empty() {
            warn!("empty payload on {topic}");
            return;
        }

        let envelope: ResponseEnvelope = match serde_json::from_slice(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!("unable to parse payload on {topic}: {err}");
                return;
            }
        };

        match TopicKind::classify(topic) {
            TopicKind::DeviceList => self.handle_device_list(envelope).await,
            TopicKind::SceneList => self.handle_scene_list(envelope.data).await,
            TopicKind::BasicData => self.handle_basic_data(envelope.data).await,
            TopicKind::AutomationTaskList => self.handle_task_list(envelope.data).await,
            TopicKind::MediaMetadata => self.handle_media_metadata(envelope).await,
            TopicKind::GroupPage => self.handle_group_page(envelope).await,
            TopicKind::DeviceEvent => self.handle_device_events(envelope.data).await,
            TopicKind::GroupEvent => self.handle_group_events(envelope.data).await,
            TopicKind::LogEvent => debug!("event/4 data: {}", envelope.data),
            TopicKind::Report => self.handle_report(topic, envelope).await,
            TopicKind::Unknown => self.handle_custom(topic, envelope).await,
        }
    }

    /// Scene list (p28): record labels, resolve room names, emit
    /// discovery per scene
    async fn handle_scene_list(&self, data: Value) {
        let Some(scenes) = data.as_array() else {
            warn!("scene list payload is not an array");
            return;
        };

        for scene in scenes {
            let Some(obj) = scene.as_object() else { continue };
            let Some(id) = obj.get("id").and_then(Value::as_i64) else {
                continue;
            };
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            let mut scene = obj.clone();
            let room_id = obj.get("room").and_then(Value::as_i64).unwrap_or(0);
            let room_name = {
                let mut session = self.session.lock().await;
                session.scenes.insert(id, name);
                if room_id == 0 {
                    WHOLE_PREMISES_LABEL.to_string()
                } else {
                    session.room_name(room_id)
                }
            };
            scene.insert("unique_id".into(), Value::String(id.to_string()));
            scene.insert("room_name".into(), Value::String(room_name));
            self.notify_discovered(EntityCategory::Scene, Value::Object(scene))
                .await;
        }
    }

    /// Automation task list (p71): label map only
    async fn handle_task_list(&self, data: Value) {
        let Some(tasks) = data.as_array() else {
            warn!("automation task payload is not an array");
            return;
        };

        let mut session = self.session.lock().await;
        for task in tasks {
            let (Some(id), Some(name)) = (
                task.get("id").and_then(Value::as_i64),
                task.get("name").and_then(Value::as_str),
            ) else {
                continue;
            };
            session.tasks.insert(id, name.to_string());
        }
    }

    /// Basic data (p33): rooms and lighting subgroups, plus the
    /// synthetic id-0 entries
    async fn handle_basic_data(&self, data: Value) {
        let mut session = self.session.lock().await;

        if let Some(rooms) = data.get("rooms").and_then(Value::as_array) {
            for room in rooms {
                let Some(id) = room.get("id").and_then(Value::as_i64) else {
                    continue;
                };
                session.rooms.insert(
                    id,
                    Room {
                        id,
                        name: room
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        icon: room.get("icon").and_then(Value::as_i64).unwrap_or(0),
                    },
                );
            }
        }

        if let Some(groups) = data.get("lightsSubgroups").and_then(Value::as_array) {
            for group in groups {
                let Some(id) = group.get("id").and_then(Value::as_i64) else {
                    continue;
                };
                session.subgroups.insert(
                    id,
                    Subgroup {
                        id,
                        name: group
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    },
                );
            }
        }

        session.rooms.insert(
            0,
            Room {
                id: 0,
                name: WHOLE_PREMISES_LABEL.to_string(),
                icon: 1,
            },
        );
        session.subgroups.insert(
            0,
            Subgroup {
                id: 0,
                name: ALL_LIGHTS_LABEL.to_string(),
            },
        );

        info!(
            "basic data loaded: {} rooms, {} subgroups",
            session.rooms.len(),
            session.subgroups.len()
        );
    }

    /// Media-player metadata (p55): invert the handle map and route to
    /// the owning serial
    async fn handle_media_metadata(&self, envelope: ResponseEnvelope) {
        let serial = {
            let session = self.session.lock().await;
            session
                .media_handles
                .iter()
                .find(|(_, handle)| **handle == envelope.seq)
                .map(|(sn, _)| sn.clone())
        };

        match serial {
            Some(sn) => self.notify_state(sn, envelope.data).await,
            None => warn!(
                "media metadata for unknown correlation handle {}",
                envelope.seq
            ),
        }
    }

    /// Free-form hub reports: surface to consumers and log
    async fn handle_report(&self, topic: &str, envelope: ResponseEnvelope) {
        info!("hub report on {topic}: {}", envelope.data);
        self.notify(GatewayNotification::ReportReceived {
            topic: topic.to_string(),
            payload: envelope.data,
        })
        .await;
    }

    /// Custom-subscribed diagnostic topics; audit-log responses (p86)
    /// get decorated before delivery
    async fn handle_custom(&self, topic: &str, envelope: ResponseEnvelope) {
        let known = self.session.lock().await.custom_topics.contains(topic);
        if !known {
            debug!("ignoring unknown topic {topic}");
            return;
        }

        let payload = if topic.ends_with("p86") {
            self.decorate_audit_log(envelope.data).await
        } else {
            envelope.data
        };

        self.notify(GatewayNotification::ReportReceived {
            topic: topic.to_string(),
            payload,
        })
        .await;
    }

    /// Wrap a payload in the request envelope and publish it
    pub async fn publish_request(&self, topic: &str, data: Value, seq: i64) -> Result<()> {
        let addr = self.config.read().await.mqtt_addr;
        let envelope = RequestEnvelope {
            seq,
            rsp_to: protocol::response_prefix(addr),
            data,
        };
        let payload = serde_json::to_vec(&envelope)?;
        self.transport.publish(topic, payload, 0, false).await
    }

    /// Publish an ad-hoc command, default sequence tag when unset
    pub async fn publish_command(&self, topic: &str, data: Value, seq: Option<i64>) -> Result<()> {
        self.publish_request(topic, data, seq.unwrap_or(CUSTOM_PUSH_SEQ))
            .await
    }

    /// Subscribe an ad-hoc diagnostic topic, once per session
    pub async fn subscribe_custom(&self, topic: &str) -> Result<()> {
        {
            let mut session = self.session.lock().await;
            if !session.custom_topics.insert(topic.to_string()) {
                return Ok(());
            }
        }
        self.transport.subscribe(topic).await
    }

    /// Republish `data` once per target serial with the `sn` field set,
    /// paced to avoid overwhelming the hub
    pub async fn publish_per_sn(
        &self,
        topic: &str,
        data: Value,
        seq: Option<i64>,
        sns: &[String],
    ) -> Result<()> {
        let pacing = self.config.read().await.pacing.bulk_send;
        for sn in sns {
            tokio::time::sleep(pacing).await;
            let mut data = data.clone();
            if let Some(obj) = data.as_object_mut() {
                obj.insert("sn".into(), Value::String(sn.clone()));
            }
            self.publish_command(topic, data, seq).await?;
        }
        Ok(())
    }

    /// Like [`publish_per_sn`](Self::publish_per_sn) but targets each
    /// device through a single-element `sns` list
    pub async fn publish_per_sns_list(
        &self,
        topic: &str,
        data: Value,
        seq: Option<i64>,
        sns: &[String],
    ) -> Result<()> {
        let pacing = self.config.read().await.pacing.bulk_send;
        for sn in sns {
            tokio::time::sleep(pacing).await;
            let mut data = data.clone();
            if let Some(obj) = data.as_object_mut() {
                obj.insert("sns".into(), serde_json::json!([sn]));
            }
            self.publish_command(topic, data, seq).await?;
        }
        Ok(())
    }

    /// Query the hub's audit log (q86) and auto-subscribe the paired
    /// response topic
    pub async fn query_audit_log(
        &self,
        place_id: i64,
        start: i64,
        time_start: i64,
        time_end: i64,
        max: i64,
        seq: Option<i64>,
    ) -> Result<()> {
        let topic = protocol::request_topic(place_id, "q86");
        let addr = self.config.read().await.mqtt_addr;
        let response = protocol::response_topic_for_request(addr, &topic);
        self.subscribe_custom(&response).await?;
        self.publish_command(
            &topic,
            serde_json::json!({
                "start": start,
                "time_start": time_start,
                "time_end": time_end,
                "max": max,
            }),
            seq,
        )
        .await
    }

    /// Number of registered device records
    pub async fn device_count(&self) -> usize {
        self.session.lock().await.devices.len()
    }

    /// Look up a registered device by serial
    pub async fn device(&self, sn: &str) -> Option<DeviceRecord> {
        self.session.lock().await.devices.get(sn).cloned()
    }

    /// Look up a registered room by id
    pub async fn room(&self, id: i64) -> Option<Room> {
        self.session.lock().await.rooms.get(&id).cloned()
    }

    /// Look up a scene label
    pub async fn scene_name(&self, id: i64) -> Option<String> {
        self.session.lock().await.scenes.get(&id).cloned()
    }

    /// Media correlation handle for a serial, if one was assigned
    pub async fn media_handle(&self, sn: &str) -> Option<i64> {
        self.session.lock().await.media_handles.get(sn).copied()
    }
}

/// Coerce a JSON value that may arrive as number or numeric string
pub(crate) fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

/// Coerce a JSON value that may arrive as number or numeric string
pub(crate) fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
