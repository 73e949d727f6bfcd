//! In-memory [`KeyValueStore`].
//!
//! Contents survive as long as the value does, so tests can drop an engine
//! and rebuild it over the same stores to simulate a process restart.
//! [`MemoryStore::set_available`] simulates a domain that cannot be read
//! or written (e.g. session storage before the user unlocks).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::kv::{KeyValueStore, StorageDomain};

pub struct MemoryStore {
    domain: StorageDomain,
    entries: RwLock<HashMap<String, String>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new(domain: StorageDomain) -> Self {
        Self {
            domain,
            entries: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of stored keys, regardless of availability.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(self.domain))
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn domain(&self) -> StorageDomain {
        self.domain
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_available()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.entries.write().await.remove(key);
        Ok(())
    }
}
