//! Contracts for the collaborators the engine drives but does not own.
//!
//! - [`CommandChannel`]: delivers `{action, reason}` to the backend.
//! - [`RestrictionSurface`]: platform primitive that restricts app
//!   execution, status bar, and keyguard features.
//! - [`PresentationSurface`]: shows lock and warning screens.
//! - [`IntegritySource`]: reads bootloader and debug signals.

use std::time::Duration;

use async_trait::async_trait;

use crate::command::CommandAction;
use crate::lock::LockType;
use crate::restriction::Restriction;

// ---------------------------------------------------------------------------
// Network command channel
// ---------------------------------------------------------------------------

/// Why a command could not be delivered. Never fatal locally.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("No network path to the backend")]
    Offline,

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("Backend returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Deliver one command. Implementations bound the wait with their own
    /// timeout.
    async fn deliver(&self, action: CommandAction, reason: &str) -> Result<(), DeliveryError>;
}

// ---------------------------------------------------------------------------
// Restriction enforcement
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
#[error("Failed to {operation} {restriction}: {message}")]
pub struct EnforcementError {
    pub operation: &'static str,
    pub restriction: &'static str,
    pub message: String,
}

/// Opaque side-effecting platform calls with a symmetric set/revert contract.
pub trait RestrictionSurface: Send + Sync {
    fn enforce(&self, restriction: &Restriction) -> Result<(), EnforcementError>;

    fn release(&self, restriction: &Restriction) -> Result<(), EnforcementError>;
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// User-facing lock screens. Pure side effect.
pub trait PresentationSurface: Send + Sync {
    fn show_lock(&self, reason: &str, lock_type: LockType);

    fn show_warning(&self, reason: &str);

    fn dismiss(&self);
}

// ---------------------------------------------------------------------------
// Integrity signals
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("Signal unavailable: {0}")]
    Unavailable(String),

    #[error("Signal read timed out")]
    Timeout,
}

#[async_trait]
pub trait IntegritySource: Send + Sync {
    async fn bootloader_locked(&self) -> Result<bool, SignalError>;

    async fn bootloader_id(&self) -> Result<String, SignalError>;

    async fn usb_debugging(&self) -> Result<bool, SignalError>;

    async fn developer_mode(&self) -> Result<bool, SignalError>;
}
