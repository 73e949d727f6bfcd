//! Management commands exchanged with the backend.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::types::Timestamp;

/// What a command asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    Lock,
    SoftLock,
    Unlock,
    Deactivate,
    /// Informational; never changes lock state.
    Alert,
}

impl CommandAction {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandAction::Lock => "lock",
            CommandAction::SoftLock => "soft_lock",
            CommandAction::Unlock => "unlock",
            CommandAction::Deactivate => "deactivate",
            CommandAction::Alert => "alert",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "lock" => Ok(CommandAction::Lock),
            "soft_lock" => Ok(CommandAction::SoftLock),
            "unlock" => Ok(CommandAction::Unlock),
            "deactivate" => Ok(CommandAction::Deactivate),
            "alert" => Ok(CommandAction::Alert),
            other => Err(CoreError::UnknownVariant {
                kind: "command action",
                value: other.to_string(),
            }),
        }
    }
}

/// An entry of the offline command queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedCommand {
    /// Correlates log lines for one entry across enqueue and drain.
    pub id: Uuid,
    pub action: CommandAction,
    pub reason: String,
    pub enqueued_at: Timestamp,
}

impl QueuedCommand {
    pub fn new(action: CommandAction, reason: impl Into<String>, enqueued_at: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            reason: reason.into(),
            enqueued_at,
        }
    }
}
