//! The Lock State Machine: sole authority over the device's custody state.
//!
//! All transitions run inside one exclusive region (`inner`), covering
//! the read, the dual-domain persist, and the enforcement side effects. The
//! hard-lock restriction set comes from
//! [`hard_lock_restrictions`] and is released in reverse by every path out
//! of HARD.

use std::sync::Arc;

use custody_core::collaborators::{PresentationSurface, RestrictionSurface};
use custody_core::lock::{LockRecord, LockState, LockType, TamperType};
use custody_core::restriction::{hard_lock_restrictions, Restriction};
use custody_core::Clock;
use custody_events::bus::{
    CustodyEvent, EventBus, EVENT_LOCK_HARD, EVENT_LOCK_REENFORCED, EVENT_LOCK_SOFT,
    EVENT_LOCK_UNLOCKED,
};
use custody_store::repositories::{LockRecordRepo, PersistError};
use tokio::sync::Mutex;

use crate::error::EngineError;

/// What the boot-time check found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootEnforcement {
    /// No lock in the boot store.
    NotLocked,
    /// SOFT record; the warning was shown again.
    Warned,
    /// HARD record; restrictions were applied by this call.
    Reenforced,
    /// HARD record whose restrictions were already applied in this process.
    AlreadyEnforced,
    /// HARD deactivation record; lock surface shown, no restrictions.
    Deactivated,
}

struct MachineState {
    current: LockRecord,
    /// Whether this process has applied the hard-lock restriction set.
    enforced: bool,
}

pub struct LockStateMachine {
    lock_id: String,
    repo: LockRecordRepo,
    restrictions: Arc<dyn RestrictionSurface>,
    presentation: Arc<dyn PresentationSurface>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    allowed_packages: Vec<String>,
    inner: Mutex<MachineState>,
}

impl LockStateMachine {
    /// Load the current record from the boot store, creating the first-run
    /// UNLOCKED record when none exists.
    ///
    /// No side effects are applied here; call
    /// [`check_and_enforce_on_boot`](Self::check_and_enforce_on_boot) for that.
    pub async fn load(
        lock_id: impl Into<String>,
        repo: LockRecordRepo,
        restrictions: Arc<dyn RestrictionSurface>,
        presentation: Arc<dyn PresentationSurface>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        allowed_packages: Vec<String>,
    ) -> Result<Self, EngineError> {
        let lock_id = lock_id.into();
        let current = match repo.load_boot().await? {
            Some(record) => record,
            None => {
                let record = LockRecord::unlocked(clock.now());
                match repo.save(&record).await {
                    Ok(()) => {}
                    Err(PersistError::Session(e)) => {
                        tracing::warn!(error = %e, "Session store unavailable for first-run lock record");
                    }
                    Err(e) => return Err(e.into()),
                }
                tracing::info!(lock_id = %lock_id, "Created first-run lock record");
                record
            }
        };

        tracing::info!(
            lock_id = %lock_id,
            state = current.state.as_str(),
            "Lock state machine loaded"
        );

        Ok(Self {
            lock_id,
            repo,
            restrictions,
            presentation,
            bus,
            clock,
            allowed_packages,
            inner: Mutex::new(MachineState {
                current,
                enforced: false,
            }),
        })
    }

    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    /// The current record.
    pub async fn current_state(&self) -> LockRecord {
        self.inner.lock().await.current.clone()
    }

    /// Transition to HARD from any state.
    ///
    /// Re-applying while already HARD updates the reason and timestamp.
    /// Deactivation records skip (and release) the restriction set.
    pub async fn apply_hard_lock(
        &self,
        reason: &str,
        lock_type: LockType,
        tamper_type: Option<TamperType>,
    ) -> Result<LockRecord, EngineError> {
        let mut inner = self.inner.lock().await;
        let record = LockRecord::hard(reason, lock_type, tamper_type, self.clock.now());
        let persisted = self.persist(&record).await?;

        if record.requires_restrictions() {
            if !inner.enforced {
                self.enforce_all();
                inner.enforced = true;
            }
        } else if inner.enforced {
            self.release_all();
            inner.enforced = false;
        }
        self.presentation.show_lock(reason, lock_type);
        inner.current = record.clone();

        tracing::warn!(
            lock_id = %self.lock_id,
            lock_type = lock_type.as_str(),
            tamper_type = tamper_type.map(TamperType::as_str),
            reason,
            "Hard lock applied"
        );
        self.publish(EVENT_LOCK_HARD, &record);

        persisted.map(|()| record)
    }

    /// Transition to SOFT: warning only, restrictions released.
    pub async fn apply_soft_lock(&self, reason: &str) -> Result<LockRecord, EngineError> {
        let mut inner = self.inner.lock().await;
        let record = LockRecord::soft(reason, self.clock.now());
        let persisted = self.persist(&record).await?;

        if inner.enforced || inner.current.is_hard() {
            self.release_all();
            inner.enforced = false;
        }
        self.presentation.show_warning(reason);
        inner.current = record.clone();

        tracing::info!(lock_id = %self.lock_id, reason, "Soft lock applied");
        self.publish(EVENT_LOCK_SOFT, &record);

        persisted.map(|()| record)
    }

    /// Transition to UNLOCKED and release every restriction unconditionally.
    pub async fn unlock_device(&self) -> Result<LockRecord, EngineError> {
        let mut inner = self.inner.lock().await;
        let record = LockRecord::unlocked(self.clock.now());
        let persisted = self.persist(&record).await?;

        self.release_all();
        inner.enforced = false;
        self.presentation.dismiss();
        let previous = std::mem::replace(&mut inner.current, record.clone());

        tracing::info!(
            lock_id = %self.lock_id,
            previous_state = previous.state.as_str(),
            "Device unlocked"
        );
        self.publish(EVENT_LOCK_UNLOCKED, &record);

        persisted.map(|()| record)
    }

    /// Re-establish enforcement after a process start from the boot store
    /// alone. The session store is reconciled afterwards, best effort.
    pub async fn check_and_enforce_on_boot(&self) -> Result<BootEnforcement, EngineError> {
        let mut inner = self.inner.lock().await;
        let Some(record) = self.repo.load_boot().await? else {
            return Ok(BootEnforcement::NotLocked);
        };

        let outcome = match (record.state, record.lock_type) {
            (LockState::Unlocked, _) => BootEnforcement::NotLocked,
            (LockState::Soft, _) => {
                self.presentation
                    .show_warning(record.reason.as_deref().unwrap_or_default());
                BootEnforcement::Warned
            }
            (LockState::Hard, Some(LockType::Deactivation)) => {
                self.presentation.show_lock(
                    record.reason.as_deref().unwrap_or_default(),
                    LockType::Deactivation,
                );
                BootEnforcement::Deactivated
            }
            (LockState::Hard, lock_type) if inner.enforced => {
                tracing::debug!(
                    lock_type = lock_type.map(LockType::as_str),
                    "Hard lock already enforced in this process"
                );
                BootEnforcement::AlreadyEnforced
            }
            (LockState::Hard, lock_type) => {
                let lock_type = lock_type.unwrap_or(LockType::Generic);
                self.enforce_all();
                inner.enforced = true;
                self.presentation
                    .show_lock(record.reason.as_deref().unwrap_or_default(), lock_type);
                tracing::warn!(
                    lock_id = %self.lock_id,
                    lock_type = lock_type.as_str(),
                    "Hard lock re-enforced on boot"
                );
                self.publish(EVENT_LOCK_REENFORCED, &record);
                BootEnforcement::Reenforced
            }
        };
        inner.current = record;
        drop(inner);

        if let Err(e) = self.repo.reconcile().await {
            tracing::warn!(error = %e, "Session store not reconciled on boot, will retry on next write");
        }

        Ok(outcome)
    }

    // ---- private helpers ----

    /// Write both domains. A boot failure aborts the transition; a session
    /// failure is handed back so the caller applies the transition and
    /// still reports the error.
    async fn persist(&self, record: &LockRecord) -> Result<Result<(), EngineError>, EngineError> {
        match self.repo.save(record).await {
            Ok(()) => Ok(Ok(())),
            Err(PersistError::Boot(e)) => {
                tracing::error!(
                    lock_id = %self.lock_id,
                    state = record.state.as_str(),
                    error = %e,
                    "Boot store write failed, transition not applied"
                );
                Err(EngineError::BootPersist(e))
            }
            Err(PersistError::Session(e)) => {
                tracing::warn!(
                    lock_id = %self.lock_id,
                    state = record.state.as_str(),
                    error = %e,
                    "Session store write failed, boot store is authoritative"
                );
                Ok(Err(EngineError::SessionPersist(e)))
            }
        }
    }

    fn restriction_set(&self) -> Vec<Restriction> {
        hard_lock_restrictions(&self.allowed_packages)
    }

    fn enforce_all(&self) {
        for restriction in self.restriction_set() {
            if let Err(e) = self.restrictions.enforce(&restriction) {
                tracing::error!(restriction = restriction.name(), error = %e, "Failed to enforce restriction");
            }
        }
    }

    fn release_all(&self) {
        for restriction in self.restriction_set().iter().rev() {
            if let Err(e) = self.restrictions.release(restriction) {
                tracing::error!(restriction = restriction.name(), error = %e, "Failed to release restriction");
            }
        }
    }

    fn publish(&self, event_type: &str, record: &LockRecord) {
        self.bus.publish(
            CustodyEvent::new(event_type)
                .with_lock_id(self.lock_id.clone())
                .with_payload(serde_json::json!({
                    "state": record.state,
                    "lock_type": record.lock_type,
                    "tamper_type": record.tamper_type,
                    "reason": record.reason,
                    "timestamp": record.timestamp,
                })),
        );
    }
}
