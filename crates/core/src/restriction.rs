//! The fixed set of platform restrictions that a hard lock applies.
//!
//! [`hard_lock_restrictions`] is the only source of the list. Enforcement
//! walks it in order and release walks the same list in reverse, so the two
//! can never drift apart.

use serde::{Deserialize, Serialize};

/// One platform-level restriction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "packages", rename_all = "snake_case")]
pub enum Restriction {
    /// Only the lock surface may run in the foreground.
    SingleAppMode,
    StatusBarDisabled,
    QuickSettingsDisabled,
    KeyguardFeaturesDisabled,
    SafeBootDisabled,
    /// Packages that stay runnable while locked.
    PackageAllowList(Vec<String>),
}

impl Restriction {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Restriction::SingleAppMode => "single_app_mode",
            Restriction::StatusBarDisabled => "status_bar_disabled",
            Restriction::QuickSettingsDisabled => "quick_settings_disabled",
            Restriction::KeyguardFeaturesDisabled => "keyguard_features_disabled",
            Restriction::SafeBootDisabled => "safe_boot_disabled",
            Restriction::PackageAllowList(_) => "package_allow_list",
        }
    }
}

/// The restriction set applied by a hard lock, in enforcement order.
pub fn hard_lock_restrictions(allowed_packages: &[String]) -> Vec<Restriction> {
    vec![
        Restriction::PackageAllowList(allowed_packages.to_vec()),
        Restriction::SingleAppMode,
        Restriction::StatusBarDisabled,
        Restriction::QuickSettingsDisabled,
        Restriction::KeyguardFeaturesDisabled,
        Restriction::SafeBootDisabled,
    ]
}
