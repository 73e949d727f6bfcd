use crate::kv::StorageDomain;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{domain} store I/O failed: {source}")]
    Io {
        domain: StorageDomain,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed for key '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0} store is not available")]
    Unavailable(StorageDomain),
}
