//! Common test utilities

#![allow(dead_code)]

use general_link_gateway::config::DiscoveryPacing;
use general_link_gateway::mock::MockTransport;
use general_link_gateway::{Gateway, GatewayConfig, GatewayNotification, LightControlMode};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// A gateway wired to a mock transport with zero pacing
pub struct Harness {
    pub gateway: Gateway,
    pub transport: Arc<MockTransport>,
    pub notifications: UnboundedReceiver<GatewayNotification>,
}

/// Build a harness with the default (single-light) control mode
pub async fn harness() -> Harness {
    harness_with_mode(LightControlMode::Single).await
}

/// Build a harness with the given lighting control mode
pub async fn harness_with_mode(mode: LightControlMode) -> Harness {
    let mut config = GatewayConfig::new("test-place");
    config.pacing = DiscoveryPacing::none();
    config.light_mode = mode;
    let transport = Arc::new(MockTransport::new());
    let gateway = Gateway::new(config, transport.clone());
    let notifications = gateway.subscribe_notifications().await;
    Harness {
        gateway,
        transport,
        notifications,
    }
}

impl Harness {
    /// Deliver an inbound message to the gateway
    pub async fn deliver(&self, topic: &str, payload: Value) {
        self.gateway
            .handle_message(topic, payload.to_string().as_bytes())
            .await;
    }

    /// Drain all pending notifications
    pub fn drain(&mut self) -> Vec<GatewayNotification> {
        let mut drained = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            drained.push(notification);
        }
        drained
    }

    /// All state-change notifications, as (key, state) pairs
    pub fn drain_state_changes(&mut self) -> Vec<(String, Value)> {
        self.drain()
            .into_iter()
            .filter_map(|n| match n {
                GatewayNotification::StateChanged { key, state } => Some((key, state)),
                _ => None,
            })
            .collect()
    }
}
