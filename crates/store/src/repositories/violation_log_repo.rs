//! Bounded log of [`Violation`]s stored under a single key.
//!
//! Like the command queue, the repo does no locking; callers serialize
//! appends.

use std::sync::Arc;

use custody_core::violation::Violation;

use crate::error::StoreError;
use crate::kv::{get_json, put_json, KeyValueStore};

const KEY: &str = "violation_log";

pub struct ViolationLogRepo {
    store: Arc<dyn KeyValueStore>,
}

impl ViolationLogRepo {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// All entries, oldest first.
    pub async fn list(&self) -> Result<Vec<Violation>, StoreError> {
        Ok(get_json(self.store.as_ref(), KEY).await?.unwrap_or_default())
    }

    /// Append `violation`, keeping only the newest `capacity` entries.
    pub async fn append(&self, violation: Violation, capacity: usize) -> Result<(), StoreError> {
        let mut entries = self.list().await?;
        entries.push(violation);
        let excess = entries.len().saturating_sub(capacity);
        entries.drain(..excess);
        put_json(self.store.as_ref(), KEY, &entries).await
    }

    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(KEY).await
    }
}
