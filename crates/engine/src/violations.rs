//! Persisted security violation log.
//!
//! Recording never fails the caller: a storage fault is logged and the
//! violation is still published on the bus by whoever detected it.

use std::sync::Arc;

use custody_core::violation::{Violation, ViolationKind, MAX_VIOLATIONS};
use custody_core::Clock;
use custody_store::repositories::ViolationLogRepo;
use tokio::sync::Mutex;

use crate::error::EngineError;

pub struct ViolationLog {
    repo: ViolationLogRepo,
    clock: Arc<dyn Clock>,
    capacity: usize,
    gate: Mutex<()>,
}

impl ViolationLog {
    pub fn new(repo: ViolationLogRepo, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            clock,
            capacity: MAX_VIOLATIONS,
            gate: Mutex::new(()),
        }
    }

    pub async fn record(&self, kind: ViolationKind, details: &str) {
        let violation = Violation::new(kind, details, self.clock.now());
        let _guard = self.gate.lock().await;
        if let Err(e) = self.repo.append(violation, self.capacity).await {
            tracing::error!(kind = kind.as_str(), details, error = %e, "Failed to persist violation");
        }
    }

    /// Logged violations, oldest first.
    pub async fn entries(&self) -> Result<Vec<Violation>, EngineError> {
        let _guard = self.gate.lock().await;
        Ok(self.repo.list().await?)
    }

    pub async fn clear(&self) -> Result<(), EngineError> {
        let _guard = self.gate.lock().await;
        self.repo.clear().await?;
        tracing::info!("Violation log cleared");
        Ok(())
    }
}
