//! Custody lock state: the [`LockRecord`] and its enums.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// LockState
// ---------------------------------------------------------------------------

/// Enforced custody state of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockState {
    /// Full usage.
    Unlocked,
    /// Usable, with a dismissible warning.
    Soft,
    /// Usage blocked, execution restricted to an allow-list.
    Hard,
}

impl LockState {
    /// String representation used in logs and events.
    pub fn as_str(self) -> &'static str {
        match self {
            LockState::Unlocked => "UNLOCKED",
            LockState::Soft => "SOFT",
            LockState::Hard => "HARD",
        }
    }

    /// Parse from the stored string form.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "UNLOCKED" => Ok(LockState::Unlocked),
            "SOFT" => Ok(LockState::Soft),
            "HARD" => Ok(LockState::Hard),
            other => Err(CoreError::UnknownVariant {
                kind: "lock state",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// LockType
// ---------------------------------------------------------------------------

/// Category of a lock, used to pick the lock surface and to decide whether
/// restrictions are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockType {
    Overdue,
    Tamper,
    /// Controlled decommissioning. HARD without restriction side effects.
    Deactivation,
    Generic,
    Reminder,
}

impl LockType {
    pub fn as_str(self) -> &'static str {
        match self {
            LockType::Overdue => "OVERDUE",
            LockType::Tamper => "TAMPER",
            LockType::Deactivation => "DEACTIVATION",
            LockType::Generic => "GENERIC",
            LockType::Reminder => "REMINDER",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name.to_ascii_uppercase().as_str() {
            "OVERDUE" => Ok(LockType::Overdue),
            "TAMPER" => Ok(LockType::Tamper),
            "DEACTIVATION" => Ok(LockType::Deactivation),
            "GENERIC" => Ok(LockType::Generic),
            "REMINDER" => Ok(LockType::Reminder),
            _ => Err(CoreError::UnknownVariant {
                kind: "lock type",
                value: name.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// TamperType
// ---------------------------------------------------------------------------

/// Which integrity signal caused a tamper lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TamperType {
    BootloaderUnlocked,
    BootloaderChanged,
    DebugEnabled,
    DeveloperModeEnabled,
}

impl TamperType {
    pub fn as_str(self) -> &'static str {
        match self {
            TamperType::BootloaderUnlocked => "bootloader_unlocked",
            TamperType::BootloaderChanged => "bootloader_changed",
            TamperType::DebugEnabled => "debug_enabled",
            TamperType::DeveloperModeEnabled => "developer_mode_enabled",
        }
    }
}

// ---------------------------------------------------------------------------
// LockRecord
// ---------------------------------------------------------------------------

/// The authoritative custody state. Exactly one is current at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub state: LockState,
    /// `None` only while unlocked.
    pub lock_type: Option<LockType>,
    pub reason: Option<String>,
    pub tamper_type: Option<TamperType>,
    /// When the current state was entered.
    pub timestamp: Timestamp,
}

impl LockRecord {
    /// The first-run record.
    pub fn unlocked(at: Timestamp) -> Self {
        Self {
            state: LockState::Unlocked,
            lock_type: None,
            reason: None,
            tamper_type: None,
            timestamp: at,
        }
    }

    pub fn hard(
        reason: impl Into<String>,
        lock_type: LockType,
        tamper_type: Option<TamperType>,
        at: Timestamp,
    ) -> Self {
        Self {
            state: LockState::Hard,
            lock_type: Some(lock_type),
            reason: Some(reason.into()),
            tamper_type,
            timestamp: at,
        }
    }

    pub fn soft(reason: impl Into<String>, at: Timestamp) -> Self {
        Self {
            state: LockState::Soft,
            lock_type: Some(LockType::Reminder),
            reason: Some(reason.into()),
            tamper_type: None,
            timestamp: at,
        }
    }

    pub fn is_hard(&self) -> bool {
        self.state == LockState::Hard
    }

    /// Whether this record requires the hard-lock restriction set.
    ///
    /// Deactivation is HARD but never restricts.
    pub fn requires_restrictions(&self) -> bool {
        self.is_hard() && self.lock_type != Some(LockType::Deactivation)
    }
}
