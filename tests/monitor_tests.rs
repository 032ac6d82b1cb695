//! Connection monitor tests

mod common;

use common::harness;
use general_link_gateway::config::{DiscoveryPacing, PairingCredentials};
use general_link_gateway::mock::{MockLocator, MockPairing, MockTransport};
use general_link_gateway::{
    ConnectionInfo, ConnectionMonitor, Gateway, GatewayConfig, GatewayError, MqttTransport,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

fn hub_info(addr: i64) -> ConnectionInfo {
    ConnectionInfo {
        host: "192.168.1.50".to_string(),
        port: 1883,
        username: None,
        password: None,
        mqtt_addr: Some(addr),
    }
}

#[tokio::test]
async fn one_locate_attempt_per_tick_while_down() {
    let h = harness().await;
    h.transport.set_connected(false);
    let locator = Arc::new(MockLocator::empty());
    let monitor = ConnectionMonitor::new(h.gateway.clone()).with_locator(locator.clone());

    let mut last_sync = Instant::now();
    monitor.tick(&mut last_sync).await;
    monitor.tick(&mut last_sync).await;

    assert_eq!(locator.attempts(), 2);
    assert!(h.transport.reconnects().is_empty());
    assert!(h.transport.published().is_empty());
}

#[tokio::test]
async fn relocation_reconnects_and_rediscovers() {
    let h = harness().await;
    h.transport.set_connected(false);
    let locator = Arc::new(MockLocator::answering(hub_info(9)));
    let monitor = ConnectionMonitor::new(h.gateway.clone()).with_locator(locator.clone());

    let mut last_sync = Instant::now();
    monitor.tick(&mut last_sync).await;

    assert_eq!(locator.attempts(), 1);
    assert_eq!(h.transport.reconnects().len(), 1);
    assert!(h.gateway.init_state().await);

    // Rediscovery targets the relocated hub address, exactly once
    let q33: Vec<_> = h
        .transport
        .published()
        .into_iter()
        .filter(|m| m.topic == "P/9/center/q33")
        .collect();
    assert_eq!(q33.len(), 1);

    // Non-initial runs reuse the existing subscriptions
    assert!(h.transport.subscriptions().is_empty());
}

#[tokio::test]
async fn pairing_takes_precedence_over_locator() {
    let mut config = GatewayConfig::new("test-place");
    config.pacing = DiscoveryPacing::none();
    config.pairing = Some(PairingCredentials {
        place: "test-place".to_string(),
        env_key: "env-key".to_string(),
        password: "pw".to_string(),
        address: "relay.example".to_string(),
    });
    let transport = Arc::new(MockTransport::disconnected());
    let gateway = Gateway::new(config, transport.clone());

    let pairing = Arc::new(MockPairing::answering(hub_info(4)));
    let locator = Arc::new(MockLocator::answering(hub_info(9)));
    let monitor = ConnectionMonitor::new(gateway)
        .with_locator(locator.clone())
        .with_pairing(pairing.clone());

    let mut last_sync = Instant::now();
    monitor.tick(&mut last_sync).await;

    assert_eq!(pairing.attempts(), 1);
    assert_eq!(locator.attempts(), 0);
    assert_eq!(transport.reconnects().len(), 1);
}

#[tokio::test]
async fn incomplete_handshake_restarts_discovery_directly() {
    // Connected transport, but init never ran
    let h = harness().await;
    let monitor = ConnectionMonitor::new(h.gateway.clone());

    let mut last_sync = Instant::now();
    monitor.tick(&mut last_sync).await;

    assert!(h.gateway.init_state().await);
    assert!(!h.transport.published().is_empty());
    assert!(h.transport.reconnects().is_empty());
}

#[tokio::test]
async fn healthy_session_gets_periodic_group_resync() {
    let h = harness().await;
    h.gateway.init(true).await.unwrap();
    h.transport.take_published();
    let monitor = ConnectionMonitor::new(h.gateway.clone());

    let mut last_sync = Instant::now() - Duration::from_secs(61);
    monitor.tick(&mut last_sync).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let resync: Vec<_> = h
        .transport
        .published()
        .into_iter()
        .filter(|m| m.topic == "P/0/center/q82")
        .collect();
    assert_eq!(resync.len(), 1);
    assert_eq!(resync[0].json()["seq"], 2);

    // Within the interval nothing further is requested
    monitor.tick(&mut last_sync).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        h.transport
            .published()
            .iter()
            .filter(|m| m.topic == "P/0/center/q82")
            .count(),
        1
    );
}

#[tokio::test]
async fn shutdown_signal_stops_the_monitor() {
    let h = harness().await;
    let monitor = ConnectionMonitor::new(h.gateway.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(monitor.run(shutdown_rx));

    shutdown_tx.send(true).unwrap();
    let result = task.await.unwrap();
    assert!(matches!(result, Err(GatewayError::Cancelled(_))));
    assert!(!h.transport.is_connected());
}
