//! Transport and collaborator seams
//!
//! The gateway consumes the MQTT-style transport, the network locator
//! and the cloud-relay pairing service only through the traits defined
//! here. Delivery is at-most-once with no ordering guarantee between
//! topics; the engine never assumes a publish was received.

#[cfg(feature = "rumqtt")]
pub mod rumqtt;

use crate::config::ConnectionInfo;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Inbound message as delivered by the transport
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Topic the message arrived on
    pub topic: String,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

/// MQTT-style publish/subscribe transport
///
/// Implementations own the socket, TLS and credential handling. The
/// engine drives them with fire-and-forget publishes and topic
/// subscriptions; received messages are pumped into
/// [`Gateway::handle_message`](crate::gateway::Gateway::handle_message)
/// by the integration layer.
#[async_trait]
pub trait MqttTransport: Send + Sync {
    /// Subscribe to a topic filter
    async fn subscribe(&self, topic: &str) -> Result<()>;

    /// Publish a payload. No delivery confirmation is provided.
    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: u8, retain: bool) -> Result<()>;

    /// Whether the underlying connection is currently up
    fn is_connected(&self) -> bool;

    /// Tear down and re-establish the connection with new broker info
    async fn reconnect(&self, info: &ConnectionInfo) -> Result<()>;

    /// Disconnect permanently
    async fn disconnect(&self) -> Result<()>;
}

/// Network locator collaborator (mDNS or similar)
#[async_trait]
pub trait HubLocator: Send + Sync {
    /// Scan for the hub announcing `identifier`; `None` when nothing
    /// answered within the timeout
    async fn locate(&self, identifier: &str, timeout: Duration) -> Result<Option<ConnectionInfo>>;
}

/// Cloud-relay pairing collaborator
#[async_trait]
pub trait HubPairing: Send + Sync {
    /// Run the pairing handshake and return relay connection info
    async fn pair(
        &self,
        credentials: &crate::config::PairingCredentials,
        timeout: Duration,
    ) -> Result<ConnectionInfo>;
}
