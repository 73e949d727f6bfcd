//! Dual-domain persistence of the [`LockRecord`].
//!
//! Every write goes through [`LockRecordRepo::save`], which writes the boot
//! domain first and the session domain second. The boot domain is
//! authoritative: a failed session write leaves the repo "dirty" and the
//! session copy is rewritten from the boot copy by
//! [`LockRecordRepo::reconcile`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use custody_core::lock::LockRecord;

use crate::error::StoreError;
use crate::kv::{get_json, put_json, KeyValueStore};

const KEY: &str = "lock_record";

/// Which half of a dual-domain write failed.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Nothing was written.
    #[error("Boot-domain write failed: {0}")]
    Boot(#[source] StoreError),

    /// The boot domain holds the new record; the session domain is stale.
    #[error("Session-domain write failed: {0}")]
    Session(#[source] StoreError),
}

pub struct LockRecordRepo {
    boot: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
    session_dirty: AtomicBool,
}

impl LockRecordRepo {
    pub fn new(boot: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>) -> Self {
        Self {
            boot,
            session,
            session_dirty: AtomicBool::new(false),
        }
    }

    /// Write `record` to both domains, boot first.
    pub async fn save(&self, record: &LockRecord) -> Result<(), PersistError> {
        put_json(self.boot.as_ref(), KEY, record)
            .await
            .map_err(PersistError::Boot)?;

        match put_json(self.session.as_ref(), KEY, record).await {
            Ok(()) => {
                self.session_dirty.store(false, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                self.session_dirty.store(true, Ordering::SeqCst);
                Err(PersistError::Session(e))
            }
        }
    }

    /// The record as the boot domain sees it.
    pub async fn load_boot(&self) -> Result<Option<LockRecord>, StoreError> {
        get_json(self.boot.as_ref(), KEY).await
    }

    pub async fn load_session(&self) -> Result<Option<LockRecord>, StoreError> {
        get_json(self.session.as_ref(), KEY).await
    }

    /// Whether the last session write failed and has not been repaired.
    pub fn session_dirty(&self) -> bool {
        self.session_dirty.load(Ordering::SeqCst)
    }

    /// Copy the boot record over the session record if they differ.
    ///
    /// Returns `true` when the session domain was rewritten. Fails with the
    /// session error if the session domain is still unavailable.
    pub async fn reconcile(&self) -> Result<bool, StoreError> {
        let Some(boot) = self.load_boot().await? else {
            return Ok(false);
        };

        let session = self.load_session().await?;
        if session.as_ref() == Some(&boot) {
            self.session_dirty.store(false, Ordering::SeqCst);
            return Ok(false);
        }

        put_json(self.session.as_ref(), KEY, &boot).await?;
        self.session_dirty.store(false, Ordering::SeqCst);
        tracing::info!(
            state = boot.state.as_str(),
            "Session lock record reconciled from boot store"
        );
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
