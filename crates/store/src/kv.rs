//! The key-value store contract shared by both storage domains.

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

/// Which persistence domain a store belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageDomain {
    /// Normal persistent storage, available once the user session is unlocked.
    Session,
    /// Available immediately after boot, before any user session exists.
    Boot,
}

impl StorageDomain {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageDomain::Session => "session",
            StorageDomain::Boot => "boot",
        }
    }
}

impl fmt::Display for StorageDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// String-keyed, string-valued durable storage.
///
/// A successful `put` or `remove` has reached durable storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    fn domain(&self) -> StorageDomain;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Read and deserialize a JSON value.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Serialization {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

/// Serialize and write a JSON value.
pub async fn put_json<T: Serialize + Sync>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|source| StoreError::Serialization {
        key: key.to_string(),
        source,
    })?;
    store.put(key, &raw).await
}
