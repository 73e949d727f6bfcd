use custody_core::CoreError;
use custody_store::repositories::PersistError;
use custody_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Nothing was persisted and the transition was not applied.
    #[error("Boot store write failed, transition not applied: {0}")]
    BootPersist(#[source] StoreError),

    /// The transition is in effect (the boot store holds it) but the session
    /// store is stale until the next write reconciles it.
    #[error("Session store write failed, transition applied from boot store: {0}")]
    SessionPersist(#[source] StoreError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<PersistError> for EngineError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::Boot(e) => EngineError::BootPersist(e),
            PersistError::Session(e) => EngineError::SessionPersist(e),
        }
    }
}

impl EngineError {
    /// Whether the requested transition nevertheless took effect.
    pub fn transition_applied(&self) -> bool {
        matches!(self, EngineError::SessionPersist(_))
    }
}
