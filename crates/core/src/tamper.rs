//! Integrity sampling and sample-to-sample tamper evaluation.
//!
//! Only the immediately preceding sample is remembered. An unreadable signal
//! is `None` ("unknown") and never triggers escalation on its own.

use serde::{Deserialize, Serialize};

use crate::lock::TamperType;
use crate::types::Timestamp;

/// Values some devices report instead of a real bootloader identifier.
const UNKNOWN_IDENTIFIERS: &[&str] = &["", "unknown", "none"];

/// One observation of the device integrity signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TamperSnapshot {
    /// `Some(true)` when the bootloader reports locked.
    pub bootloader_locked: Option<bool>,
    pub bootloader_id: Option<String>,
    pub usb_debugging: Option<bool>,
    pub developer_mode: Option<bool>,
    pub sampled_at: Timestamp,
}

impl TamperSnapshot {
    /// A sample in which nothing could be read.
    pub fn unknown(at: Timestamp) -> Self {
        Self {
            bootloader_locked: None,
            bootloader_id: None,
            usb_debugging: None,
            developer_mode: None,
            sampled_at: at,
        }
    }
}

/// Map a raw bootloader identifier to `None` when it carries no information.
pub fn normalize_identifier(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if UNKNOWN_IDENTIFIERS
        .iter()
        .any(|u| trimmed.eq_ignore_ascii_case(u))
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Outcome of comparing two consecutive samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TamperVerdict {
    /// Hard-lock the device.
    Escalate {
        tamper_type: TamperType,
        reason: String,
    },
    /// Worth reporting, not worth locking.
    Suspicious {
        tamper_type: TamperType,
        reason: String,
    },
    Clean,
}

/// Compare `current` against the previous sample.
///
/// An unlocked bootloader flag escalates alone. Identifier drift escalates
/// only when both samples carry a known identifier. Debug flags turning on
/// escalate only when `lock_on_debug` is set.
pub fn evaluate(
    previous: Option<&TamperSnapshot>,
    current: &TamperSnapshot,
    lock_on_debug: bool,
) -> TamperVerdict {
    if current.bootloader_locked == Some(false) {
        return TamperVerdict::Escalate {
            tamper_type: TamperType::BootloaderUnlocked,
            reason: "bootloader unlocked".into(),
        };
    }

    let Some(previous) = previous else {
        return TamperVerdict::Clean;
    };

    if let (Some(before), Some(now)) = (&previous.bootloader_id, &current.bootloader_id) {
        if before != now {
            return TamperVerdict::Escalate {
                tamper_type: TamperType::BootloaderChanged,
                reason: format!("bootloader identifier changed from '{before}' to '{now}'"),
            };
        }
    }

    let debug_turned_on = [
        (
            previous.usb_debugging,
            current.usb_debugging,
            TamperType::DebugEnabled,
            "USB debugging enabled",
        ),
        (
            previous.developer_mode,
            current.developer_mode,
            TamperType::DeveloperModeEnabled,
            "developer mode enabled",
        ),
    ]
    .into_iter()
    .find(|(before, now, _, _)| *before == Some(false) && *now == Some(true));

    match debug_turned_on {
        Some((_, _, tamper_type, reason)) if lock_on_debug => TamperVerdict::Escalate {
            tamper_type,
            reason: reason.into(),
        },
        Some((_, _, tamper_type, reason)) => TamperVerdict::Suspicious {
            tamper_type,
            reason: reason.into(),
        },
        None => TamperVerdict::Clean,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
