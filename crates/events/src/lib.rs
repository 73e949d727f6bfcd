//! Custody event bus and backend delivery.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`CustodyEvent`]: the event envelope published on every transition,
//!   lockout, tamper detection, and queue drain.
//! - [`delivery`]: the HTTP implementation of the network command channel.

pub mod bus;
pub mod delivery;

pub use bus::{CustodyEvent, EventBus};
pub use delivery::http::{HttpChannelConfig, HttpCommandChannel};
