//! Platform collaborators.
//!
//! Integrity signals are read from Android system properties and global
//! settings through `getprop` / `settings`, each call bounded by a timeout.
//! Restrictions and screens are tracked in process and exposed to the
//! lock-screen UI through the control socket.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use custody_core::collaborators::{
    EnforcementError, IntegritySource, PresentationSurface, RestrictionSurface, SignalError,
};
use custody_core::lock::LockType;
use custody_core::restriction::Restriction;
use serde::Serialize;
use tokio::process::Command;

/// Bound on a single property read.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Integrity source
// ---------------------------------------------------------------------------

/// Reads integrity signals with the platform's command-line tools.
#[derive(Debug, Clone)]
pub struct AndroidIntegritySource {
    timeout: Duration,
}

impl Default for AndroidIntegritySource {
    fn default() -> Self {
        Self {
            timeout: READ_TIMEOUT,
        }
    }
}

impl AndroidIntegritySource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<String, SignalError> {
        let result = tokio::time::timeout(self.timeout, Command::new(program).args(args).output()).await;

        match result {
            Ok(Ok(output)) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
            }
            Ok(Ok(output)) => Err(SignalError::Unavailable(format!(
                "{program} {} exited with {}",
                args.join(" "),
                output.status.code().unwrap_or(-1)
            ))),
            Ok(Err(e)) => Err(SignalError::Unavailable(format!("failed to execute {program}: {e}"))),
            Err(_) => {
                tracing::warn!(program, ?args, "Property read timed out");
                Err(SignalError::Timeout)
            }
        }
    }

    async fn getprop(&self, name: &str) -> Result<String, SignalError> {
        self.run("getprop", &[name]).await
    }

    async fn global_setting(&self, key: &str) -> Result<String, SignalError> {
        self.run("settings", &["get", "global", key]).await
    }
}

#[async_trait]
impl IntegritySource for AndroidIntegritySource {
    async fn bootloader_locked(&self) -> Result<bool, SignalError> {
        let flash_locked = self.getprop("ro.boot.flash.locked").await?;
        if !flash_locked.is_empty() {
            return parse_flag(&flash_locked);
        }
        parse_verified_boot_state(&self.getprop("ro.boot.verifiedbootstate").await?)
    }

    async fn bootloader_id(&self) -> Result<String, SignalError> {
        self.getprop("ro.bootloader").await
    }

    async fn usb_debugging(&self) -> Result<bool, SignalError> {
        parse_flag(&self.global_setting("adb_enabled").await?)
    }

    async fn developer_mode(&self) -> Result<bool, SignalError> {
        parse_flag(&self.global_setting("development_settings_enabled").await?)
    }
}

/// `"1"` / `"0"` style flags.
pub fn parse_flag(raw: &str) -> Result<bool, SignalError> {
    match raw.trim() {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(SignalError::Unavailable(format!("unrecognized flag value '{other}'"))),
    }
}

/// Verified boot state: `green` and `yellow` mean a locked bootloader,
/// `orange` an unlocked one.
pub fn parse_verified_boot_state(raw: &str) -> Result<bool, SignalError> {
    match raw.trim() {
        "green" | "yellow" => Ok(true),
        "orange" => Ok(false),
        other => Err(SignalError::Unavailable(format!("unrecognized verified boot state '{other}'"))),
    }
}

// ---------------------------------------------------------------------------
// Restrictions
// ---------------------------------------------------------------------------

/// Tracks which restrictions are in force.
#[derive(Debug, Default)]
pub struct TrackedRestrictions {
    active: Mutex<BTreeSet<&'static str>>,
}

impl TrackedRestrictions {
    /// Names of the restrictions currently enforced, sorted.
    pub fn active(&self) -> Vec<&'static str> {
        self.lock().iter().copied().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<&'static str>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl RestrictionSurface for TrackedRestrictions {
    fn enforce(&self, restriction: &Restriction) -> Result<(), EnforcementError> {
        if let Restriction::PackageAllowList(packages) = restriction {
            tracing::info!(restriction = restriction.name(), ?packages, "Restriction enforced");
        } else {
            tracing::info!(restriction = restriction.name(), "Restriction enforced");
        }
        self.lock().insert(restriction.name());
        Ok(())
    }

    fn release(&self, restriction: &Restriction) -> Result<(), EnforcementError> {
        if self.lock().remove(restriction.name()) {
            tracing::info!(restriction = restriction.name(), "Restriction released");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Presentation
// ---------------------------------------------------------------------------

/// What the lock-screen UI should display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "screen", rename_all = "snake_case")]
pub enum Screen {
    None,
    Lock { reason: String, lock_type: LockType },
    Warning { reason: String },
}

#[derive(Debug)]
pub struct ScreenState {
    current: Mutex<Screen>,
}

impl Default for ScreenState {
    fn default() -> Self {
        Self {
            current: Mutex::new(Screen::None),
        }
    }
}

impl ScreenState {
    pub fn current(&self) -> Screen {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set(&self, screen: Screen) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = screen;
    }
}

impl PresentationSurface for ScreenState {
    fn show_lock(&self, reason: &str, lock_type: LockType) {
        tracing::info!(reason, lock_type = lock_type.as_str(), "Showing lock screen");
        self.set(Screen::Lock {
            reason: reason.to_string(),
            lock_type,
        });
    }

    fn show_warning(&self, reason: &str) {
        tracing::info!(reason, "Showing warning screen");
        self.set(Screen::Warning {
            reason: reason.to_string(),
        });
    }

    fn dismiss(&self) {
        tracing::info!("Lock screen dismissed");
        self.set(Screen::None);
    }
}
