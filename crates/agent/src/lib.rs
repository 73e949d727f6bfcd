//! `custody-agent` library crate.
//!
//! Re-exports internal modules for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod config;
pub mod connectivity;
pub mod control;
pub mod heartbeat;
pub mod platform;
