//! Durable key-value storage for the custody engine.
//!
//! Two [`StorageDomain`]s exist: the session domain (normal storage,
//! readable once the user session is unlocked) and the boot domain
//! (readable immediately after boot). [`FileStore`] backs both on disk;
//! [`MemoryStore`] is used in tests and can simulate an unavailable domain.
//!
//! Typed access goes through the repositories in [`repositories`].

pub mod error;
pub mod file;
pub mod kv;
pub mod memory;
pub mod repositories;

pub use error::StoreError;
pub use file::FileStore;
pub use kv::{get_json, put_json, KeyValueStore, StorageDomain};
pub use memory::MemoryStore;
