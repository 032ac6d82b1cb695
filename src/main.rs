//! Gateway daemon over a rumqttc transport
//!
//! Connects to the broker named by `GATEWAY_BROKER_URL`, runs the
//! discovery handshake, then keeps the session alive through the
//! connection monitor until Ctrl-C.

use general_link_gateway::config::ConnectionInfo;
use general_link_gateway::logging::{init_logging, LogConfig};
use general_link_gateway::monitor::ConnectionMonitor;
use general_link_gateway::transport::rumqtt::RumqttTransport;
use general_link_gateway::{Gateway, GatewayConfig, GatewayError, MqttTransport};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging(LogConfig::from_env())?;

    let config = GatewayConfig::from_env()?;
    let broker = std::env::var("GATEWAY_BROKER_URL")
        .map_err(|_| GatewayError::config("GATEWAY_BROKER_URL not set"))?;
    let broker = ConnectionInfo::from_url(&broker)?;

    let (transport, mut inbound) = RumqttTransport::new(format!("general-link-{}", config.name));
    let transport = Arc::new(transport);
    let gateway = Gateway::new(config, transport.clone());

    let mut notifications = gateway.subscribe_notifications().await;
    tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            info!("notification: {notification:?}");
        }
    });

    let pump = gateway.clone();
    tokio::spawn(async move {
        while let Some(message) = inbound.recv().await {
            pump.handle_message(&message.topic, &message.payload).await;
        }
    });

    transport.reconnect(&broker).await?;
    if let Err(err) = gateway.init(true).await {
        // The monitor retries; a slow broker at boot is not fatal
        warn!("initial discovery failed: {err}");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor = ConnectionMonitor::new(gateway);
    let monitor_task = tokio::spawn(monitor.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    shutdown_tx.send(true)?;

    match monitor_task.await? {
        Err(GatewayError::Cancelled(_)) => Ok(()),
        Err(err) => {
            error!("monitor exited abnormally: {err}");
            Err(err.into())
        }
        Ok(()) => Ok(()),
    }
}
