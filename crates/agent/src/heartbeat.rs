//! Heartbeat poller.
//!
//! Every interval the agent reports its lock state and integrity signals to
//! the backend and turns the response into at most one [`ServerCommand`].
//! A failed heartbeat changes nothing locally, and a lock the device raised
//! itself is never released by a heartbeat.

use std::sync::Arc;
use std::time::Duration;

use custody_core::collaborators::{DeliveryError, IntegritySource};
use custody_core::command::CommandAction;
use custody_core::lock::{LockRecord, LockState, LockType, TamperType};
use custody_core::{Clock, Timestamp};
use custody_engine::{raised_locally, DispatchOutcome, Engine, EngineError, ServerCommand};
use custody_events::HttpCommandChannel;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

const DEACTIVATION_REQUESTED: &str = "requested";
const DEACTIVATE_NOW: &str = "DEACTIVATE_NOW";
const REASON_PAYMENT_OVERDUE: &str = "Payment overdue";
const REASON_SECURITY_ISSUE: &str = "Security issue";

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeartbeatResponse {
    #[serde(default)]
    pub content: Option<LockContent>,
    #[serde(default)]
    pub deactivation: Option<Deactivation>,
    #[serde(default)]
    pub next_payment: Option<NextPayment>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LockContent {
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Deactivation {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NextPayment {
    #[serde(default)]
    pub unlock_password: Option<String>,
}

/// Request body of one heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeartbeatReport {
    pub device_id: String,
    pub lock_state: LockState,
    pub lock_type: Option<LockType>,
    pub tamper_type: Option<TamperType>,
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootloader: Option<String>,
    pub security_info: SecurityInfo,
    pub timestamp: Timestamp,
}

/// Integrity signals as last read. Unreadable signals are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecurityInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_bootloader_unlocked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_usb_debugging_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_developer_mode_enabled: Option<bool>,
}

impl HeartbeatReport {
    /// Build the report for `current`, reading the integrity signals fresh
    /// and the time from the engine's clock.
    pub async fn collect(engine: &Engine, current: &LockRecord, integrity: &dyn IntegritySource) -> Self {
        Self {
            device_id: engine.lock_id().to_string(),
            lock_state: current.state,
            lock_type: current.lock_type,
            tamper_type: current.tamper_type,
            reason: current.reason.clone(),
            bootloader: integrity
                .bootloader_id()
                .await
                .ok()
                .map(|raw| raw.trim().to_string())
                .filter(|id| !id.is_empty()),
            security_info: SecurityInfo {
                is_bootloader_unlocked: integrity.bootloader_locked().await.ok().map(|locked| !locked),
                is_usb_debugging_enabled: integrity.usb_debugging().await.ok(),
                is_developer_mode_enabled: integrity.developer_mode().await.ok(),
            },
            timestamp: engine.clock().now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Directive
// ---------------------------------------------------------------------------

/// What a heartbeat response asks the device to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeartbeatDirective {
    pub command: Option<ServerCommand>,
    pub unlock_code: Option<String>,
}

/// Lock type for a backend lock reason.
pub fn lock_type_for_reason(reason: &str) -> LockType {
    match reason {
        REASON_PAYMENT_OVERDUE => LockType::Overdue,
        REASON_SECURITY_ISSUE => LockType::Tamper,
        _ => LockType::Generic,
    }
}

impl HeartbeatDirective {
    /// Derive the directive against the device's `current` record.
    ///
    /// A requested deactivation wins over everything else. While a lock
    /// the device raised itself is in force, the backend's lock state is
    /// ignored. A lock that is already in force with the same type and
    /// reason is not re-applied.
    pub fn from_response(response: &HeartbeatResponse, current: &LockRecord) -> Self {
        let unlock_code = response
            .next_payment
            .as_ref()
            .and_then(|p| p.unlock_password.clone())
            .filter(|code| !code.trim().is_empty());

        Self {
            command: Self::command(response, current),
            unlock_code,
        }
    }

    fn command(response: &HeartbeatResponse, current: &LockRecord) -> Option<ServerCommand> {
        let already = |lock_type: LockType, reason: &str| {
            current.is_hard()
                && current.lock_type == Some(lock_type)
                && current.reason.as_deref() == Some(reason)
        };

        if let Some(deactivation) = &response.deactivation {
            if deactivation.status.as_deref() == Some(DEACTIVATION_REQUESTED)
                && deactivation.command.as_deref() == Some(DEACTIVATE_NOW)
            {
                let reason = deactivation
                    .reason
                    .clone()
                    .unwrap_or_else(|| "deactivation requested".to_string());
                if already(LockType::Deactivation, &reason) {
                    return None;
                }
                return Some(ServerCommand::new(CommandAction::Deactivate, reason));
            }
        }

        let content = response.content.as_ref()?;
        if raised_locally(current) {
            tracing::debug!(
                is_locked = content.is_locked,
                "Local lock in force, backend lock state ignored"
            );
            return None;
        }

        if content.is_locked {
            let reason = content
                .reason
                .clone()
                .unwrap_or_else(|| REASON_PAYMENT_OVERDUE.to_string());
            let lock_type = lock_type_for_reason(&reason);
            if already(lock_type, &reason) {
                return None;
            }
            return Some(ServerCommand::new(CommandAction::Lock, reason).with_lock_type(lock_type));
        }

        (current.state != LockState::Unlocked)
            .then(|| ServerCommand::new(CommandAction::Unlock, "released by backend"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Malformed heartbeat response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Failed to encode heartbeat: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

pub struct HeartbeatPoller {
    channel: Arc<HttpCommandChannel>,
    engine: Arc<Engine>,
    integrity: Arc<dyn IntegritySource>,
    interval: Duration,
}

impl HeartbeatPoller {
    pub fn new(
        channel: Arc<HttpCommandChannel>,
        engine: Arc<Engine>,
        integrity: Arc<dyn IntegritySource>,
        interval: Duration,
    ) -> Self {
        Self {
            channel,
            engine,
            integrity,
            interval,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        tracing::info!(interval_secs = self.interval.as_secs(), "Heartbeat poller started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Heartbeat poller stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::warn!(error = %e, "Heartbeat failed");
                    }
                }
            }
        }
    }

    /// Send one heartbeat and apply its directive.
    pub async fn poll_once(&self) -> Result<Option<DispatchOutcome>, HeartbeatError> {
        let current = self.engine.state_machine().current_state().await;
        let report = HeartbeatReport::collect(&self.engine, &current, self.integrity.as_ref()).await;
        let body = serde_json::to_value(&report).map_err(HeartbeatError::Encode)?;

        let raw = self.channel.heartbeat(&body).await?;
        let response: HeartbeatResponse = serde_json::from_value(raw)?;
        let directive = HeartbeatDirective::from_response(&response, &current);
        apply_directive(&self.engine, &directive).await
    }
}

/// Store any unlock code, then dispatch the command.
pub async fn apply_directive(
    engine: &Engine,
    directive: &HeartbeatDirective,
) -> Result<Option<DispatchOutcome>, HeartbeatError> {
    if let Some(code) = &directive.unlock_code {
        engine.unlock_codes().store_code(code).await?;
    }

    let Some(command) = &directive.command else {
        return Ok(None);
    };

    match engine.dispatcher().dispatch(command).await {
        Ok(outcome) => Ok(Some(outcome)),
        Err(e) if e.transition_applied() => {
            tracing::warn!(error = %e, "Heartbeat command applied with stale session store");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
