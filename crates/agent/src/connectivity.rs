//! Connectivity observer.
//!
//! Probes the backend at a fixed interval and drains the offline command
//! queue whenever the device comes (back) online.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use custody_engine::{DrainReport, Engine};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::config::ConfigError;

/// Answers "can the backend be reached right now?".
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn reachable(&self) -> bool;
}

/// TCP connect to the backend's host and port.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    /// Probe the host and port of `url` (default port by scheme).
    pub fn for_url(url: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::Invalid {
            name: "BACKEND_URL",
            expected: "a URL with a host",
            value: url.to_string(),
        };
        let parsed = reqwest::Url::parse(url).map_err(|_| invalid())?;
        let host = parsed.host_str().ok_or_else(invalid)?;
        let port = parsed.port_or_known_default().ok_or_else(invalid)?;
        Ok(Self::new(format!("{host}:{port}"), timeout))
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn reachable(&self) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect(&self.address)).await,
            Ok(Ok(_))
        )
    }
}

/// Result of one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityChange {
    Unchanged,
    WentOffline,
    /// The queue was drained on the transition.
    CameOnline(DrainReport),
}

pub struct ConnectivityObserver {
    probe: Arc<dyn ReachabilityProbe>,
    engine: Arc<Engine>,
    interval: Duration,
    /// `None` until the first observation.
    online: Option<bool>,
}

impl ConnectivityObserver {
    pub fn new(probe: Arc<dyn ReachabilityProbe>, engine: Arc<Engine>, interval: Duration) -> Self {
        Self {
            probe,
            engine,
            interval,
            online: None,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        tracing::info!(interval_secs = self.interval.as_secs(), "Connectivity observer started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Connectivity observer stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.observe().await;
                }
            }
        }
    }

    /// Probe once. The first online observation counts as a transition so
    /// entries left over from a previous run are delivered.
    pub async fn observe(&mut self) -> ConnectivityChange {
        let online = self.probe.reachable().await;
        let previous = self.online.replace(online);

        match (previous, online) {
            (Some(true), true) | (Some(false), false) => ConnectivityChange::Unchanged,
            (None, false) => ConnectivityChange::Unchanged,
            (_, false) => {
                tracing::warn!("Backend unreachable, commands will be queued");
                ConnectivityChange::WentOffline
            }
            (_, true) => {
                tracing::info!("Backend reachable, draining offline queue");
                match self.engine.drain_queue().await {
                    Ok(report) => ConnectivityChange::CameOnline(report),
                    Err(e) => {
                        tracing::error!(error = %e, "Offline queue drain failed");
                        ConnectivityChange::CameOnline(DrainReport::default())
                    }
                }
            }
        }
    }
}
