//! Connection monitor
//!
//! A long-lived background task that watches transport health and the
//! gateway's init progress. When either is down it re-locates the hub
//! (pairing handshake when cloud-relay credentials are configured,
//! network locator otherwise) and drives a full non-initial rediscovery
//! through the gateway's serialized entry point. While healthy it
//! triggers the periodic group resync. The loop only terminates on the
//! external shutdown signal, which it propagates after cleanup; every
//! per-tick error is logged and swallowed.

use crate::error::{GatewayError, Result};
use crate::gateway::Gateway;
use crate::transport::{HubLocator, HubPairing};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Background health monitor for one gateway session
pub struct ConnectionMonitor {
    gateway: Gateway,
    locator: Option<Arc<dyn HubLocator>>,
    pairing: Option<Arc<dyn HubPairing>>,
}

impl ConnectionMonitor {
    /// Create a monitor without relocation collaborators; it can still
    /// restart the handshake when the transport itself recovers
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            locator: None,
            pairing: None,
        }
    }

    /// Attach a network locator
    pub fn with_locator(mut self, locator: Arc<dyn HubLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    /// Attach a cloud-relay pairing collaborator
    pub fn with_pairing(mut self, pairing: Arc<dyn HubPairing>) -> Self {
        self.pairing = Some(pairing);
        self
    }

    /// Run until the shutdown signal fires
    ///
    /// Returns `Err(Cancelled)` on shutdown so callers can distinguish
    /// an ordered stop from the loop ever falling through (it does
    /// not).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let poll = self.gateway.config.read().await.monitor.poll_interval;
        let mut ticker = interval(poll);
        // Interval's first tick is immediate; skip it so a fresh
        // session gets one full poll period to finish its handshake
        ticker.tick().await;

        let mut last_group_sync = Instant::now();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(&mut last_group_sync).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("connection monitor stopping on shutdown signal");
                        if let Err(err) = self.gateway.disconnect().await {
                            warn!("disconnect during shutdown failed: {err}");
                        }
                        return Err(GatewayError::cancelled("connection monitor stopped"));
                    }
                }
            }
        }
    }

    /// One health check pass
    pub async fn tick(&self, last_group_sync: &mut Instant) {
        let connected = self.gateway.is_connected();
        let initialized = self.gateway.init_state().await;

        if !connected || !initialized {
            self.recover(connected, initialized).await;
            return;
        }

        let resync_every = self
            .gateway
            .config
            .read()
            .await
            .monitor
            .group_resync_interval;
        if last_group_sync.elapsed() >= resync_every {
            *last_group_sync = Instant::now();
            let gateway = self.gateway.clone();
            tokio::spawn(async move {
                if let Err(err) = gateway.sync_group_status(false).await {
                    warn!("periodic group resync failed: {err}");
                }
            });
        }
    }

    /// Attempt to relocate the hub and restart the handshake
    async fn recover(&self, connected: bool, initialized: bool) {
        let (name, pairing_creds, locate_timeout) = {
            let config = self.gateway.config.read().await;
            (
                config.name.clone(),
                config.pairing.clone(),
                config.monitor.locate_timeout,
            )
        };

        let info = match (&self.pairing, &pairing_creds) {
            (Some(pairing), Some(creds)) => {
                match pairing.pair(creds, locate_timeout).await {
                    Ok(info) => Some(info),
                    Err(err) => {
                        error!("pairing handshake failed: {err}");
                        None
                    }
                }
            }
            _ => match &self.locator {
                Some(locator) => match locator.locate(&name, locate_timeout).await {
                    Ok(info) => info,
                    Err(err) => {
                        error!("hub relocation failed: {err}");
                        None
                    }
                },
                None => None,
            },
        };

        match info {
            Some(info) => {
                info!("hub relocated at {}:{}, reconnecting", info.host, info.port);
                if let Err(err) = self.gateway.apply_connection(&info).await {
                    error!("reconnect with relocated hub failed: {err}");
                    return;
                }
                if let Err(err) = self.gateway.init(false).await {
                    warn!("rediscovery after relocation failed: {err}");
                }
            }
            // The hub is reachable but our own handshake never
            // completed; restart it directly
            None if connected && !initialized => {
                debug!("transport up but handshake incomplete, re-running discovery");
                if let Err(err) = self.gateway.init(false).await {
                    warn!("rediscovery failed: {err}");
                }
            }
            None => debug!("hub not located, retrying next tick"),
        }
    }
}
