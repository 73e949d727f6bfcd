//! Small agent settings kept in the boot domain: the provisioning flag and
//! the hash of the offline unlock code.

use std::sync::Arc;

use crate::error::StoreError;
use crate::kv::KeyValueStore;

const SETUP_IN_PROGRESS: &str = "setup_in_progress";
const UNLOCK_CODE_HASH: &str = "unlock_code_sha256";

pub struct SettingsRepo {
    store: Arc<dyn KeyValueStore>,
}

impl SettingsRepo {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn setup_in_progress(&self) -> Result<bool, StoreError> {
        Ok(self.store.get(SETUP_IN_PROGRESS).await?.as_deref() == Some("true"))
    }

    pub async fn set_setup_in_progress(&self, in_progress: bool) -> Result<(), StoreError> {
        if in_progress {
            self.store.put(SETUP_IN_PROGRESS, "true").await
        } else {
            self.store.remove(SETUP_IN_PROGRESS).await
        }
    }

    pub async fn unlock_code_hash(&self) -> Result<Option<String>, StoreError> {
        self.store.get(UNLOCK_CODE_HASH).await
    }

    pub async fn set_unlock_code_hash(&self, hash: &str) -> Result<(), StoreError> {
        self.store.put(UNLOCK_CODE_HASH, hash).await
    }

    pub async fn clear_unlock_code(&self) -> Result<(), StoreError> {
        self.store.remove(UNLOCK_CODE_HASH).await
    }
}
