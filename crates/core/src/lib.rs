//! Pure domain types and logic for the custody engine.
//!
//! Nothing in this crate performs I/O. Storage, delivery, and platform
//! enforcement are reached through the traits in [`collaborators`] and
//! implemented by the `custody-store`, `custody-events`, and
//! `custody-agent` crates.

pub mod clock;
pub mod collaborators;
pub mod command;
pub mod error;
pub mod lock;
pub mod lockout;
pub mod restriction;
pub mod tamper;
pub mod types;
pub mod violation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use types::{LockId, Timestamp};
