//! Security violation log entries.
//!
//! Tamper detections, suspicious integrity changes, and lockouts are kept
//! in a bounded, persisted log so they survive a restart and can be read
//! back by the lock-screen UI or support tooling.

use serde::{Deserialize, Serialize};

use crate::types::Timestamp;

/// Entries kept in the log. The oldest are dropped first.
pub const MAX_VIOLATIONS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// An integrity change that raised a TAMPER hard lock.
    TamperDetected,
    /// An integrity change that was logged but not escalated.
    SuspiciousChange,
    /// Too many failed unlock attempts.
    Lockout,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::TamperDetected => "tamper_detected",
            ViolationKind::SuspiciousChange => "suspicious_change",
            ViolationKind::Lockout => "lockout",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub timestamp: Timestamp,
    #[serde(rename = "type")]
    pub kind: ViolationKind,
    pub details: String,
}

impl Violation {
    pub fn new(kind: ViolationKind, details: impl Into<String>, at: Timestamp) -> Self {
        Self {
            timestamp: at,
            kind,
            details: details.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn serializes_kind_as_type() {
        let violation = Violation::new(ViolationKind::Lockout, "5 failed attempts", Utc::now());
        let json = serde_json::to_value(&violation).unwrap();
        assert_eq!(json["type"], "lockout");
        assert_eq!(json["details"], "5 failed attempts");
        assert!(json.get("kind").is_none());
    }
}
