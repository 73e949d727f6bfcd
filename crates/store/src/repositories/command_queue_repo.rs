//! Append-only FIFO log of [`QueuedCommand`]s stored under a single key.
//!
//! The repo does no locking of its own; the offline queue serializes
//! read-modify-write sequences.

use std::sync::Arc;

use custody_core::command::QueuedCommand;

use crate::error::StoreError;
use crate::kv::{get_json, put_json, KeyValueStore};

const KEY: &str = "command_queue";

pub struct CommandQueueRepo {
    store: Arc<dyn KeyValueStore>,
}

impl CommandQueueRepo {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// All entries, oldest first.
    pub async fn list(&self) -> Result<Vec<QueuedCommand>, StoreError> {
        Ok(get_json(self.store.as_ref(), KEY).await?.unwrap_or_default())
    }

    pub async fn append(&self, command: QueuedCommand) -> Result<(), StoreError> {
        let mut entries = self.list().await?;
        entries.push(command);
        put_json(self.store.as_ref(), KEY, &entries).await
    }

    /// Remove the `count` oldest entries. Entries appended after they were
    /// read are kept.
    pub async fn remove_oldest(&self, count: usize) -> Result<(), StoreError> {
        let entries = self.list().await?;
        let remaining: Vec<QueuedCommand> = entries.into_iter().skip(count).collect();
        if remaining.is_empty() {
            self.store.remove(KEY).await
        } else {
            put_json(self.store.as_ref(), KEY, &remaining).await
        }
    }
}
