//! Maps backend management commands onto state machine operations.

use std::sync::Arc;

use custody_core::command::CommandAction;
use custody_core::lock::{LockRecord, LockType};
use custody_events::bus::{CustodyEvent, EventBus, EVENT_ALERT_RECEIVED};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::lockout::LOCKOUT_LOCK_REASON;
use crate::state_machine::LockStateMachine;

/// A management command received from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerCommand {
    pub action: CommandAction,
    #[serde(default)]
    pub reason: String,
    /// Only meaningful for [`CommandAction::Lock`]; defaults to GENERIC.
    #[serde(default)]
    pub lock_type: Option<LockType>,
}

impl ServerCommand {
    pub fn new(action: CommandAction, reason: impl Into<String>) -> Self {
        Self {
            action,
            reason: reason.into(),
            lock_type: None,
        }
    }

    pub fn with_lock_type(mut self, lock_type: LockType) -> Self {
        self.lock_type = Some(lock_type);
        self
    }
}

/// Whether `record` is a hard lock the device raised on its own: a tamper
/// detection or an unlock lockout. Such a lock is released only by an
/// explicit unlock, never by a backend that merely reports "not locked".
pub fn raised_locally(record: &LockRecord) -> bool {
    record.is_hard()
        && (record.tamper_type.is_some()
            || record.reason.as_deref() == Some(LOCKOUT_LOCK_REASON))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied(LockRecord),
    /// Informational command; lock state untouched.
    Alerted,
}

pub struct CommandDispatcher {
    state_machine: Arc<LockStateMachine>,
    bus: Arc<EventBus>,
}

impl CommandDispatcher {
    pub fn new(state_machine: Arc<LockStateMachine>, bus: Arc<EventBus>) -> Self {
        Self { state_machine, bus }
    }

    /// Apply exactly one state machine operation for `command`.
    pub async fn dispatch(&self, command: &ServerCommand) -> Result<DispatchOutcome, EngineError> {
        tracing::info!(
            action = command.action.as_str(),
            reason = %command.reason,
            "Dispatching server command"
        );

        let record = match command.action {
            CommandAction::Lock => {
                let lock_type = command.lock_type.unwrap_or(LockType::Generic);
                self.state_machine
                    .apply_hard_lock(&command.reason, lock_type, None)
                    .await?
            }
            CommandAction::SoftLock => self.state_machine.apply_soft_lock(&command.reason).await?,
            CommandAction::Unlock => self.state_machine.unlock_device().await?,
            CommandAction::Deactivate => {
                self.state_machine
                    .apply_hard_lock(&command.reason, LockType::Deactivation, None)
                    .await?
            }
            CommandAction::Alert => {
                self.bus.publish(
                    CustodyEvent::new(EVENT_ALERT_RECEIVED)
                        .with_lock_id(self.state_machine.lock_id())
                        .with_payload(serde_json::json!({ "reason": command.reason })),
                );
                return Ok(DispatchOutcome::Alerted);
            }
        };

        Ok(DispatchOutcome::Applied(record))
    }
}
