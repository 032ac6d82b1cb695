//! Gateway engine bridging a place-controller hub to smart-home
//! platforms over an MQTT-style transport
//!
//! The engine discovers the hub's device/scene/room inventory through a
//! staged, paginated handshake, decodes per-device state-change events
//! into addressable notifications, maintains derived light-group
//! aggregate state, and recovers automatically from connection loss.
//!
//! # Features
//!
//! - Topic-routed request/response and event protocol
//! - Paginated device, scene, room and automation-task discovery
//! - Per-device-type decoding and multi-view notification fan-out
//! - (room, subgroup) light-group aggregation with periodic resync
//! - Connection monitor with hub relocation and re-initialization
//! - Audit-log decoration with human-readable labels
//!
//! # Example
//!
//! ```rust,no_run
//! use general_link_gateway::{Gateway, GatewayConfig};
//! use general_link_gateway::mock::MockTransport;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::new("my-place");
//!     let gateway = Gateway::new(config, Arc::new(MockTransport::new()));
//!     let mut notifications = gateway.subscribe_notifications().await;
//!     gateway.init(true).await?;
//!     while let Some(notification) = notifications.recv().await {
//!         println!("{notification:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod monitor;
pub mod protocol;
pub mod transport;

pub mod mock;

// Re-export main types
pub use config::{ConnectionInfo, GatewayConfig, LightControlMode};
pub use error::{GatewayError, Result};
pub use gateway::{EntityCategory, Gateway, GatewayNotification};
pub use monitor::ConnectionMonitor;
pub use transport::{HubLocator, HubPairing, MqttTransport};
