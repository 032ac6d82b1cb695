//! rumqttc-backed transport
//!
//! Optional concrete transport for deployments that talk to the hub's
//! broker directly. Received publishes are pumped into an unbounded
//! channel; the binary forwards them to the gateway's routing entry
//! point. Connection state tracks the broker acknowledgment, so
//! `is_connected` reflects the live session rather than the socket.

use crate::config::ConnectionInfo;
use crate::error::{GatewayError, Result};
use crate::transport::{InboundMessage, MqttTransport};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const EVENT_LOOP_CAPACITY: usize = 100;

/// MQTT transport over rumqttc
pub struct RumqttTransport {
    client_id: String,
    client: Mutex<Option<AsyncClient>>,
    connected: Arc<AtomicBool>,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl RumqttTransport {
    /// Create a transport and the channel inbound messages arrive on
    pub fn new(client_id: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<InboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                client_id: client_id.into(),
                client: Mutex::new(None),
                connected: Arc::new(AtomicBool::new(false)),
                inbound: tx,
                event_loop: Mutex::new(None),
            },
            rx,
        )
    }

    async fn start(&self, info: &ConnectionInfo) -> Result<()> {
        let mut options = MqttOptions::new(self.client_id.clone(), info.host.clone(), info.port);
        options.set_keep_alive(Duration::from_secs(5));
        if let (Some(username), Some(password)) = (&info.username, &info.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        let (client, mut event_loop) = AsyncClient::new(options, EVENT_LOOP_CAPACITY);

        let connected = Arc::clone(&self.connected);
        let inbound = self.inbound.clone();
        let handle = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        debug!("broker session established");
                        connected.store(true, Ordering::SeqCst);
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = InboundMessage {
                            topic: publish.topic.clone(),
                            payload: publish.payload.to_vec(),
                        };
                        if inbound.send(message).is_err() {
                            // Receiver gone, the session is over
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        connected.store(false, Ordering::SeqCst);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        connected.store(false, Ordering::SeqCst);
                        warn!("mqtt event loop error: {err}");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        if let Some(old) = self.event_loop.lock().await.replace(handle) {
            old.abort();
        }
        *self.client.lock().await = Some(client);
        Ok(())
    }

    async fn client(&self) -> Result<AsyncClient> {
        self.client
            .lock()
            .await
            .clone()
            .ok_or_else(|| GatewayError::connection("transport not started"))
    }
}

fn to_qos(qos: u8) -> QoS {
    match qos {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

#[async_trait]
impl MqttTransport for RumqttTransport {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.client()
            .await?
            .subscribe(topic, QoS::AtMostOnce)
            .await
            .map_err(|e| GatewayError::transport(format!("subscribe {topic}: {e}")))
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: u8, retain: bool) -> Result<()> {
        self.client()
            .await?
            .publish(topic, to_qos(qos), retain, payload)
            .await
            .map_err(|e| GatewayError::transport(format!("publish {topic}: {e}")))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self, info: &ConnectionInfo) -> Result<()> {
        if let Some(client) = self.client.lock().await.take() {
            // Best effort, the old session may already be gone
            let _ = client.disconnect().await;
        }
        self.connected.store(false, Ordering::SeqCst);
        self.start(info).await
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(client) = self.client.lock().await.take() {
            client
                .disconnect()
                .await
                .map_err(|e| GatewayError::transport(format!("disconnect: {e}")))?;
        }
        if let Some(handle) = self.event_loop.lock().await.take() {
            handle.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
