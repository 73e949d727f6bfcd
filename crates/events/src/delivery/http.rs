//! HTTP implementation of the network command channel.
//!
//! [`HttpCommandChannel`] POSTs `{action, reason, timestamp}` to the
//! backend's device command endpoint and fetches heartbeat directives. A
//! single attempt is made per call, bounded by a generous timeout; retrying
//! is the offline queue's job, not the transport's.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use custody_core::collaborators::{CommandChannel, DeliveryError};
use custody_core::command::CommandAction;

/// Default request timeout. Mobile networks can be very slow.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct HttpChannelConfig {
    /// Backend base URL, e.g. `https://custody.example.com`.
    pub base_url: String,
    pub device_id: String,
    pub timeout: Duration,
}

/// Delivers commands and fetches heartbeats over HTTP.
pub struct HttpCommandChannel {
    client: reqwest::Client,
    config: HttpChannelConfig,
}

impl HttpCommandChannel {
    pub fn new(config: HttpChannelConfig) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn device_url(&self, resource: &str) -> String {
        format!(
            "{}/api/devices/{}/{resource}/",
            self.config.base_url.trim_end_matches('/'),
            self.config.device_id
        )
    }

    pub fn commands_url(&self) -> String {
        self.device_url("commands")
    }

    pub fn heartbeat_url(&self) -> String {
        self.device_url("heartbeat")
    }

    /// Send a heartbeat and return the backend's JSON response body.
    pub async fn heartbeat(
        &self,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DeliveryError> {
        let response = self.post(&self.heartbeat_url(), body).await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, DeliveryError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        if !response.status().is_success() {
            return Err(DeliveryError::HttpStatus(response.status().as_u16()));
        }
        Ok(response)
    }

    fn map_error(&self, e: reqwest::Error) -> DeliveryError {
        if e.is_timeout() {
            DeliveryError::Timeout(self.config.timeout)
        } else if e.is_connect() {
            DeliveryError::Offline
        } else {
            DeliveryError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl CommandChannel for HttpCommandChannel {
    async fn deliver(&self, action: CommandAction, reason: &str) -> Result<(), DeliveryError> {
        let payload = serde_json::json!({
            "action": action.as_str(),
            "reason": reason,
            "timestamp": Utc::now(),
        });

        match self.post(&self.commands_url(), &payload).await {
            Ok(_) => {
                tracing::debug!(action = action.as_str(), "Command delivered");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(action = action.as_str(), error = %e, "Command delivery failed");
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
