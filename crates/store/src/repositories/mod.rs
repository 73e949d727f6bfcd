//! Typed repositories over [`KeyValueStore`](crate::kv::KeyValueStore).

pub mod command_queue_repo;
pub mod lock_record_repo;
pub mod lockout_repo;
pub mod settings_repo;
pub mod violation_log_repo;

pub use command_queue_repo::CommandQueueRepo;
pub use lock_record_repo::{LockRecordRepo, PersistError};
pub use lockout_repo::LockoutRepo;
pub use settings_repo::SettingsRepo;
pub use violation_log_repo::ViolationLogRepo;
