//! Mock implementations for testing
//!
//! In-memory stand-ins for the transport and locator collaborators,
//! recording everything the engine does so tests can assert on the
//! exact request traffic.

use crate::config::ConnectionInfo;
use crate::error::{GatewayError, Result};
use crate::transport::{HubLocator, HubPairing, MqttTransport};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A publish recorded by the mock transport
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: u8,
    pub retain: bool,
}

impl PublishedMessage {
    /// Parse the payload as JSON
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.payload).expect("published payload is not JSON")
    }
}

/// Mock transport recording subscriptions and publishes
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    fail_publish: AtomicBool,
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<String>>,
    reconnects: Mutex<Vec<ConnectionInfo>>,
}

impl MockTransport {
    /// Create a connected mock transport
    pub fn new() -> Self {
        let transport = Self::default();
        transport.connected.store(true, Ordering::SeqCst);
        transport
    }

    /// Create a disconnected mock transport
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Flip the reported connection state
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make subsequent publishes fail
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// All publishes so far
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Drain recorded publishes
    pub fn take_published(&self) -> Vec<PublishedMessage> {
        std::mem::take(&mut self.published.lock().unwrap())
    }

    /// All subscribed topics so far
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Connection infos passed to `reconnect`
    pub fn reconnects(&self) -> Vec<ConnectionInfo> {
        self.reconnects.lock().unwrap().clone()
    }
}

#[async_trait]
impl MqttTransport for MockTransport {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.subscriptions.lock().unwrap().push(topic.to_string());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, qos: u8, retain: bool) -> Result<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(GatewayError::transport("mock publish failure"));
        }
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn reconnect(&self, info: &ConnectionInfo) -> Result<()> {
        self.reconnects.lock().unwrap().push(info.clone());
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock locator returning a preset result and counting attempts
#[derive(Default)]
pub struct MockLocator {
    result: Mutex<Option<ConnectionInfo>>,
    attempts: AtomicUsize,
}

impl MockLocator {
    /// A locator that never finds the hub
    pub fn empty() -> Self {
        Self::default()
    }

    /// A locator that answers with the given connection info
    pub fn answering(info: ConnectionInfo) -> Self {
        Self {
            result: Mutex::new(Some(info)),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of locate calls made
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HubLocator for MockLocator {
    async fn locate(
        &self,
        _identifier: &str,
        _timeout: Duration,
    ) -> Result<Option<ConnectionInfo>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.lock().unwrap().clone())
    }
}

/// Mock pairing collaborator
#[derive(Default)]
pub struct MockPairing {
    result: Mutex<Option<ConnectionInfo>>,
    attempts: AtomicUsize,
}

impl MockPairing {
    /// A pairing service that answers with the given connection info
    pub fn answering(info: ConnectionInfo) -> Self {
        Self {
            result: Mutex::new(Some(info)),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of pairing attempts made
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HubPairing for MockPairing {
    async fn pair(
        &self,
        _credentials: &crate::config::PairingCredentials,
        _timeout: Duration,
    ) -> Result<ConnectionInfo> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.result
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| GatewayError::timeout("mock pairing timed out"))
    }
}
