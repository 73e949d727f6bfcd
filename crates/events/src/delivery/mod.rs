//! Delivery channels that push commands and alerts to the backend.

pub mod http;
