//! File-backed [`KeyValueStore`].
//!
//! Each domain is a single JSON object in `<dir>/custody.json`. Writes go
//! to a sibling temp file that is synced and renamed over the original, so
//! a crash mid-write leaves either the old or the new contents.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::kv::{KeyValueStore, StorageDomain};

const FILE_NAME: &str = "custody.json";
const TMP_FILE_NAME: &str = "custody.json.tmp";

pub struct FileStore {
    domain: StorageDomain,
    dir: PathBuf,
    /// Loaded on first access.
    cache: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>, domain: StorageDomain) -> Self {
        Self {
            domain,
            dir: dir.into(),
            cache: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            domain: self.domain,
            source,
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let path = self.dir.join(FILE_NAME);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|source| StoreError::Serialization {
                    key: FILE_NAME.to_string(),
                    source,
                })
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(self.io_err(e)),
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(|source| {
            StoreError::Serialization {
                key: FILE_NAME.to_string(),
                source,
            }
        })?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.io_err(e))?;

        let tmp = self.dir.join(TMP_FILE_NAME);
        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| self.io_err(e))?;
        file.write_all(&bytes).await.map_err(|e| self.io_err(e))?;
        file.sync_all().await.map_err(|e| self.io_err(e))?;
        drop(file);

        tokio::fs::rename(&tmp, self.dir.join(FILE_NAME))
            .await
            .map_err(|e| self.io_err(e))
    }

    /// Apply `change` to a copy of the entries and persist it. The cache is
    /// only updated once the write succeeded.
    async fn mutate<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, String>) + Send,
    {
        let mut cache = self.cache.lock().await;
        let mut entries = match cache.as_ref() {
            Some(entries) => entries.clone(),
            None => self.load().await?,
        };
        change(&mut entries);
        self.persist(&entries).await?;
        *cache = Some(entries);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    fn domain(&self) -> StorageDomain {
        self.domain
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut cache = self.cache.lock().await;
        if cache.is_none() {
            *cache = Some(self.load().await?);
        }
        Ok(cache.as_ref().and_then(|entries| entries.get(key).cloned()))
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        let value = value.to_string();
        self.mutate(move |entries| {
            entries.insert(key, value);
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        self.mutate(move |entries| {
            entries.remove(&key);
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
