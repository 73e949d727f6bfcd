//! Offline unlock code.
//!
//! The backend hands out a one-time unlock password with each heartbeat.
//! Only its SHA-256 is kept, in the boot store, so a device that has lost
//! connectivity can still be unlocked by a code read out over the phone.
//! Every entry goes through the [`LockoutTracker`].

use std::sync::Arc;

use custody_store::repositories::SettingsRepo;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::EngineError;
use crate::lockout::LockoutTracker;
use crate::state_machine::LockStateMachine;

const ATTEMPT_CONTEXT: &str = "offline_unlock_code";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockOutcome {
    Unlocked,
    /// Wrong code, attempts still allowed.
    Rejected,
    /// The lockout is in force, or this failure started it.
    LockedOut,
    /// No code has been provisioned.
    NoCode,
}

/// Hex SHA-256 of a code, ignoring surrounding whitespace and case.
pub fn hash_code(code: &str) -> String {
    let digest = Sha256::digest(code.trim().to_uppercase().as_bytes());
    format!("{digest:x}")
}

pub struct UnlockCodeVerifier {
    settings: Arc<SettingsRepo>,
    tracker: Arc<LockoutTracker>,
    state_machine: Arc<LockStateMachine>,
}

impl UnlockCodeVerifier {
    pub fn new(
        settings: Arc<SettingsRepo>,
        tracker: Arc<LockoutTracker>,
        state_machine: Arc<LockStateMachine>,
    ) -> Self {
        Self {
            settings,
            tracker,
            state_machine,
        }
    }

    /// Replace the provisioned code. Blank codes are ignored.
    pub async fn store_code(&self, code: &str) -> Result<(), EngineError> {
        if code.trim().is_empty() {
            return Ok(());
        }
        self.settings.set_unlock_code_hash(&hash_code(code)).await?;
        tracing::info!("Offline unlock code updated");
        Ok(())
    }

    pub async fn try_unlock(&self, lock_id: &str, code: &str) -> Result<UnlockOutcome, EngineError> {
        let Some(stored) = self.settings.unlock_code_hash().await? else {
            tracing::warn!(lock_id, "Unlock code entered but none is provisioned");
            return Ok(UnlockOutcome::NoCode);
        };

        let matched = hash_code(code) == stored;
        if !self.tracker.record_attempt(lock_id, matched, ATTEMPT_CONTEXT).await {
            return Ok(UnlockOutcome::LockedOut);
        }
        if !matched {
            return Ok(UnlockOutcome::Rejected);
        }

        match self.state_machine.unlock_device().await {
            Ok(_) => {}
            Err(e) if e.transition_applied() => {
                tracing::warn!(lock_id, error = %e, "Unlocked by code with stale session store");
            }
            Err(e) => return Err(e),
        }
        tracing::info!(lock_id, "Device unlocked by offline code");
        Ok(UnlockOutcome::Unlocked)
    }
}
