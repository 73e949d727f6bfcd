//! Persistence of per-subject [`LockoutWindow`]s, one key per lock id.

use std::sync::Arc;

use custody_core::lockout::LockoutWindow;

use crate::error::StoreError;
use crate::kv::{get_json, put_json, KeyValueStore};

const KEY_PREFIX: &str = "lockout:";

pub struct LockoutRepo {
    store: Arc<dyn KeyValueStore>,
}

impl LockoutRepo {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn key(lock_id: &str) -> String {
        format!("{KEY_PREFIX}{lock_id}")
    }

    pub async fn find(&self, lock_id: &str) -> Result<Option<LockoutWindow>, StoreError> {
        get_json(self.store.as_ref(), &Self::key(lock_id)).await
    }

    /// Store the window, or delete the key when nothing is left in it.
    pub async fn save(&self, lock_id: &str, window: &LockoutWindow) -> Result<(), StoreError> {
        if window.is_empty() {
            return self.clear(lock_id).await;
        }
        put_json(self.store.as_ref(), &Self::key(lock_id), window).await
    }

    pub async fn clear(&self, lock_id: &str) -> Result<(), StoreError> {
        self.store.remove(&Self::key(lock_id)).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use custody_core::lockout::LockoutPolicy;

    use super::*;
    use crate::kv::StorageDomain;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn windows_are_scoped_per_lock_id() {
        let store = Arc::new(MemoryStore::new(StorageDomain::Session));
        let repo = LockoutRepo::new(store.clone());

        let mut window = LockoutWindow::default();
        window.record(Utc::now(), false, Some("bad pin"), &LockoutPolicy::default());
        repo.save("loan-1", &window).await.unwrap();

        assert_eq!(repo.find("loan-1").await.unwrap(), Some(window));
        assert_eq!(repo.find("loan-2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn saving_an_empty_window_deletes_the_key() {
        let store = Arc::new(MemoryStore::new(StorageDomain::Session));
        let repo = LockoutRepo::new(store.clone());

        let mut window = LockoutWindow::default();
        window.record(Utc::now(), false, None, &LockoutPolicy::default());
        repo.save("loan-1", &window).await.unwrap();
        assert_eq!(store.len().await, 1);

        window.clear();
        repo.save("loan-1", &window).await.unwrap();
        assert!(store.is_empty().await);
    }
}
