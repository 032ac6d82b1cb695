//! Gateway configuration
//!
//! Session-level knobs for one place-controller connection: hub
//! addressing, lighting control mode, discovery pacing, and connection
//! monitor timings. Defaults match the timings the hub firmware was
//! tuned against; tests override pacing to zero.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Maximum page size for device-list queries
pub const DEVICE_COUNT_MAX: i64 = 60;

/// Device-type codes the gateway asks the hub to enumerate
pub const DISCOVERY_DEV_TYPES: [i64; 10] = [1, 2, 3, 4, 5, 7, 9, 11, 16, 20];

/// Serial of the reference panel whose `a19` reading corrects the
/// reported temperature of every constant-temperature panel
pub const DEFAULT_TEMP_REFERENCE_SN: &str = "A4C138A1E1BAE09E";

/// Lighting control mode for the place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LightControlMode {
    /// Each light is addressed individually
    #[default]
    Single,
    /// Lights are addressed through (room, subgroup) aggregates
    Group,
}

/// Credentials for cloud-relay pairing, used when the hub is not
/// reachable by local service discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingCredentials {
    /// Place identifier registered with the relay
    pub place: String,
    /// Environment key issued at provisioning time
    pub env_key: String,
    /// Place password
    pub password: String,
    /// Relay destination address
    pub address: String,
}

/// Fixed settle delays between discovery stages
///
/// The hub offers no request/response correlation beyond the echoed
/// `seq` tag, so the sequencer paces itself between stages instead of
/// waiting on replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryPacing {
    /// After the basic-data query (rooms/subgroups)
    pub after_basic: Duration,
    /// After the first device-list page request
    pub after_devices: Duration,
    /// After the scene-list query
    pub after_scenes: Duration,
    /// Before the initial group snapshot request (group mode only)
    pub before_group_snapshot: Duration,
    /// Before the deferred serial-number re-query
    pub before_deferred: Duration,
    /// Before a periodic (non-init) group resync request
    pub group_resync_delay: Duration,
    /// Between per-serial sends in the bulk command helper
    pub bulk_send: Duration,
}

impl Default for DiscoveryPacing {
    fn default() -> Self {
        Self {
            after_basic: Duration::from_secs(3),
            after_devices: Duration::from_secs(3),
            after_scenes: Duration::from_secs(3),
            before_group_snapshot: Duration::from_secs(5),
            before_deferred: Duration::from_secs(10),
            group_resync_delay: Duration::from_secs(15),
            bulk_send: Duration::from_secs(1),
        }
    }
}

impl DiscoveryPacing {
    /// Zero all delays, for tests
    pub fn none() -> Self {
        Self {
            after_basic: Duration::ZERO,
            after_devices: Duration::ZERO,
            after_scenes: Duration::ZERO,
            before_group_snapshot: Duration::ZERO,
            before_deferred: Duration::ZERO,
            group_resync_delay: Duration::ZERO,
            bulk_send: Duration::ZERO,
        }
    }
}

/// Connection monitor timings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Health check tick. The reference behavior interleaved 10s and
    /// 20s sleeps; one consistent 15s tick replaces both.
    pub poll_interval: Duration,
    /// Minimum interval between periodic group resyncs
    pub group_resync_interval: Duration,
    /// Locator scan timeout per attempt
    pub locate_timeout: Duration,
    /// Suppress non-initial rediscovery within this window of the last
    /// completed init
    pub init_debounce: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            group_resync_interval: Duration::from_secs(60),
            locate_timeout: Duration::from_secs(2),
            init_debounce: Duration::from_secs(20),
        }
    }
}

/// Configuration for one gateway session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Place name, used as the locator identifier
    pub name: String,

    /// Hub address segment in request/response topics
    pub mqtt_addr: i64,

    /// Subscribe event topics with a wildcard address segment. Local
    /// installs see events from every sub-controller, not just the
    /// configured one.
    pub local: bool,

    /// Lighting control mode
    pub light_mode: LightControlMode,

    /// Cloud-relay pairing credentials, when configured
    pub pairing: Option<PairingCredentials>,

    /// Serial of the temperature reference panel
    pub temp_reference_sn: String,

    /// Discovery stage pacing
    #[serde(default)]
    pub pacing: DiscoveryPacing,

    /// Connection monitor timings
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl GatewayConfig {
    /// Create a config for the named place with default timings
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mqtt_addr: 0,
            local: true,
            light_mode: LightControlMode::default(),
            pairing: None,
            temp_reference_sn: DEFAULT_TEMP_REFERENCE_SN.to_string(),
            pacing: DiscoveryPacing::default(),
            monitor: MonitorConfig::default(),
        }
    }

    /// Create configuration from environment variables
    ///
    /// Reads `GATEWAY_PLACE_NAME`, `GATEWAY_MQTT_ADDR`, `GATEWAY_LOCAL`
    /// and `GATEWAY_LIGHT_MODE`.
    pub fn from_env() -> Result<Self> {
        let name = std::env::var("GATEWAY_PLACE_NAME")
            .map_err(|_| GatewayError::config("GATEWAY_PLACE_NAME not set"))?;

        let mut config = Self::new(name);

        if let Ok(addr) = std::env::var("GATEWAY_MQTT_ADDR") {
            config.mqtt_addr = addr
                .parse()
                .map_err(|e| GatewayError::config(format!("invalid GATEWAY_MQTT_ADDR: {e}")))?;
        }

        if let Ok(local) = std::env::var("GATEWAY_LOCAL") {
            config.local = local.to_lowercase() != "false";
        }

        if let Ok(mode) = std::env::var("GATEWAY_LIGHT_MODE") {
            config.light_mode = match mode.to_lowercase().as_str() {
                "group" => LightControlMode::Group,
                "single" => LightControlMode::Single,
                other => {
                    return Err(GatewayError::config(format!(
                        "invalid GATEWAY_LIGHT_MODE: {other}"
                    )))
                }
            };
        }

        Ok(config)
    }

    /// Address segment used on event-topic subscriptions
    pub fn event_addr(&self) -> String {
        if self.local {
            "+".to_string()
        } else {
            self.mqtt_addr.to_string()
        }
    }
}

/// Broker connection info produced by the locator or pairing
/// collaborators and consumed by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Broker host
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Broker username, when required
    pub username: Option<String>,
    /// Broker password, when required
    pub password: Option<String>,
    /// Hub address segment reported by the announcement
    pub mqtt_addr: Option<i64>,
}

impl ConnectionInfo {
    /// Parse from an `mqtt://host:port` style URL
    pub fn from_url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)
            .map_err(|e| GatewayError::config(format!("invalid broker url {raw}: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| GatewayError::config(format!("broker url {raw} has no host")))?
            .to_string();
        Ok(Self {
            host,
            port: url.port().unwrap_or(1883),
            username: (!url.username().is_empty()).then(|| url.username().to_string()),
            password: url.password().map(|p| p.to_string()),
            mqtt_addr: None,
        })
    }
}
