//! Failed-unlock lockout window (pure logic).
//!
//! The store-backed tracker lives in `custody-engine`; this module only
//! decides what an attempt means given the persisted [`LockoutWindow`].

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Failures inside the window that trigger a lockout.
pub const DEFAULT_THRESHOLD: u32 = 5;

/// Trailing window over which failures are counted (minutes).
pub const DEFAULT_WINDOW_MINS: i64 = 30;

/// How long a lockout lasts once triggered (minutes).
pub const DEFAULT_LOCKOUT_MINS: i64 = 30;

/// Rejected attempts kept while a lockout is in force. Older ones are
/// dropped first.
pub const MAX_REJECTED_ATTEMPTS: usize = 20;

// ---------------------------------------------------------------------------
// LockoutPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub threshold: u32,
    pub window: chrono::Duration,
    pub lockout_duration: chrono::Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            window: chrono::Duration::minutes(DEFAULT_WINDOW_MINS),
            lockout_duration: chrono::Duration::minutes(DEFAULT_LOCKOUT_MINS),
        }
    }
}

impl LockoutPolicy {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.threshold == 0 {
            return Err(CoreError::Validation(
                "Lockout threshold must be at least 1".into(),
            ));
        }
        if self.window <= chrono::Duration::zero() {
            return Err(CoreError::Validation(
                "Lockout window must be positive".into(),
            ));
        }
        if self.lockout_duration <= chrono::Duration::zero() {
            return Err(CoreError::Validation(
                "Lockout duration must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------------

/// How a recorded attempt was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
    /// Arrived while a lockout was active and was not evaluated.
    RejectedLockedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptEntry {
    pub at: Timestamp,
    pub outcome: AttemptOutcome,
    /// Caller-supplied context, e.g. `"bad pin"`.
    pub context: Option<String>,
}

/// Result of evaluating one attempt against the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptDecision {
    /// Successful attempt; history cleared.
    Accepted,
    /// Failure below the threshold; further attempts are still allowed.
    FailureRecorded { failures: u32 },
    /// This failure reached the threshold.
    LockoutStarted { failures: u32, expires_at: Timestamp },
    /// A lockout was already active.
    Rejected { expires_at: Timestamp },
}

impl AttemptDecision {
    /// Whether the caller may proceed with further attempts.
    pub fn allowed(&self) -> bool {
        matches!(
            self,
            AttemptDecision::Accepted | AttemptDecision::FailureRecorded { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// LockoutWindow
// ---------------------------------------------------------------------------

/// Persisted attempt history for one lock subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutWindow {
    /// Ordered oldest first.
    pub attempts: Vec<AttemptEntry>,
    pub lockout_expires_at: Option<Timestamp>,
}

impl LockoutWindow {
    /// Expiry of a lockout that is still in force at `now`.
    pub fn active_lockout(&self, now: Timestamp) -> Option<Timestamp> {
        self.lockout_expires_at.filter(|expires| *expires > now)
    }

    /// A lockout flag is set but its expiry has passed.
    pub fn lockout_expired(&self, now: Timestamp) -> bool {
        matches!(self.lockout_expires_at, Some(expires) if expires <= now)
    }

    /// Drop attempts older than the trailing window. The lockout flag is kept.
    pub fn prune(&mut self, now: Timestamp, window: chrono::Duration) {
        let cutoff = now - window;
        self.attempts.retain(|a| a.at > cutoff);
    }

    /// Failures inside the trailing window. Rejected attempts do not count.
    pub fn failures_in_window(&self, now: Timestamp, window: chrono::Duration) -> u32 {
        let cutoff = now - window;
        self.attempts
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::Failure && a.at > cutoff)
            .count() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty() && self.lockout_expires_at.is_none()
    }

    /// Evaluate and record one attempt.
    ///
    /// An expired lockout is cleared together with its failure history
    /// before the attempt is evaluated, so counting restarts from zero.
    pub fn record(
        &mut self,
        now: Timestamp,
        success: bool,
        context: Option<&str>,
        policy: &LockoutPolicy,
    ) -> AttemptDecision {
        if let Some(expires_at) = self.active_lockout(now) {
            self.prune(now, policy.window);
            self.attempts.push(AttemptEntry {
                at: now,
                outcome: AttemptOutcome::RejectedLockedOut,
                context: context.map(str::to_string),
            });
            self.cap_rejected(MAX_REJECTED_ATTEMPTS);
            return AttemptDecision::Rejected { expires_at };
        }

        if self.lockout_expired(now) {
            self.clear();
        }

        if success {
            self.clear();
            return AttemptDecision::Accepted;
        }

        self.prune(now, policy.window);
        self.attempts.push(AttemptEntry {
            at: now,
            outcome: AttemptOutcome::Failure,
            context: context.map(str::to_string),
        });

        let failures = self.failures_in_window(now, policy.window);
        if failures >= policy.threshold {
            let expires_at = now + policy.lockout_duration;
            self.lockout_expires_at = Some(expires_at);
            AttemptDecision::LockoutStarted {
                failures,
                expires_at,
            }
        } else {
            AttemptDecision::FailureRecorded { failures }
        }
    }

    /// Keep at most `max` rejected attempts, dropping the oldest.
    fn cap_rejected(&mut self, max: usize) {
        let rejected = self
            .attempts
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::RejectedLockedOut)
            .count();
        let mut excess = rejected.saturating_sub(max);
        self.attempts.retain(|a| {
            if excess > 0 && a.outcome == AttemptOutcome::RejectedLockedOut {
                excess -= 1;
                return false;
            }
            true
        });
    }

    pub fn clear(&mut self) {
        self.attempts.clear();
        self.lockout_expires_at = None;
    }

    pub fn status(&self, now: Timestamp, window: chrono::Duration) -> LockoutStatus {
        let active = self.active_lockout(now);
        LockoutStatus {
            is_locked_out: active.is_some(),
            remaining_secs: active
                .map(|expires| (expires - now).num_seconds().max(0) as u64)
                .unwrap_or(0),
            failed_attempts: self.failures_in_window(now, window),
        }
    }
}

/// Snapshot reported by `getLockoutStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutStatus {
    pub is_locked_out: bool,
    /// Seconds until the lockout lifts; zero when not locked out.
    pub remaining_secs: u64,
    pub failed_attempts: u32,
}

impl LockoutStatus {
    pub fn clear() -> Self {
        Self {
            is_locked_out: false,
            remaining_secs: 0,
            failed_attempts: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};

    use super::*;

    fn policy() -> LockoutPolicy {
        LockoutPolicy::default()
    }

    #[test]
    fn fifth_failure_starts_lockout() {
        let mut window = LockoutWindow::default();
        let now = Utc::now();

        for n in 1..=4 {
            let decision = window.record(now, false, Some("bad pin"), &policy());
            assert_eq!(decision, AttemptDecision::FailureRecorded { failures: n });
            assert!(decision.allowed());
        }

        let decision = window.record(now, false, Some("bad pin"), &policy());
        assert_matches!(decision, AttemptDecision::LockoutStarted { failures: 5, .. });
        assert!(!decision.allowed());
        assert_eq!(window.lockout_expires_at, Some(now + Duration::minutes(30)));
    }

    #[test]
    fn attempts_during_lockout_are_rejected_and_not_counted() {
        let mut window = LockoutWindow::default();
        let now = Utc::now();
        for _ in 0..5 {
            window.record(now, false, None, &policy());
        }

        let later = now + Duration::minutes(1);
        let decision = window.record(later, false, None, &policy());
        assert_matches!(decision, AttemptDecision::Rejected { .. });
        assert_eq!(window.failures_in_window(later, policy().window), 5);

        // A correct code is also rejected while locked out.
        let decision = window.record(later, true, None, &policy());
        assert_matches!(decision, AttemptDecision::Rejected { .. });
        assert_eq!(
            window.attempts.last().map(|a| a.outcome),
            Some(AttemptOutcome::RejectedLockedOut)
        );
    }

    #[test]
    fn repeated_attempts_during_lockout_stay_bounded() {
        let mut window = LockoutWindow::default();
        let now = Utc::now();
        for _ in 0..5 {
            window.record(now, false, Some("bad pin"), &policy());
        }

        for n in 0..200 {
            let at = now + Duration::seconds(n);
            let decision = window.record(at, false, Some("spam"), &policy());
            assert_matches!(decision, AttemptDecision::Rejected { .. });
        }

        assert_eq!(window.attempts.len(), 5 + MAX_REJECTED_ATTEMPTS);
        let later = now + Duration::seconds(200);
        assert_eq!(window.failures_in_window(later, policy().window), 5);
        assert_eq!(
            window.attempts.last().map(|a| a.at),
            Some(now + Duration::seconds(199))
        );
    }

    #[test]
    fn success_clears_history() {
        let mut window = LockoutWindow::default();
        let now = Utc::now();
        for _ in 0..4 {
            window.record(now, false, None, &policy());
        }
        assert_eq!(window.record(now, true, None, &policy()), AttemptDecision::Accepted);
        assert!(window.is_empty());

        let decision = window.record(now, false, None, &policy());
        assert_eq!(decision, AttemptDecision::FailureRecorded { failures: 1 });
    }

    #[test]
    fn failures_outside_window_do_not_count() {
        let mut window = LockoutWindow::default();
        let start = Utc::now();
        for _ in 0..4 {
            window.record(start, false, None, &policy());
        }

        let later = start + Duration::minutes(31);
        let decision = window.record(later, false, None, &policy());
        assert_eq!(decision, AttemptDecision::FailureRecorded { failures: 1 });
        assert_eq!(window.attempts.len(), 1);
    }

    #[test]
    fn expired_lockout_is_evaluated_normally() {
        let mut window = LockoutWindow::default();
        let start = Utc::now();
        for _ in 0..5 {
            window.record(start, false, None, &policy());
        }

        let after = start + Duration::minutes(30);
        assert!(window.lockout_expired(after));
        let decision = window.record(after, false, None, &policy());
        assert_eq!(decision, AttemptDecision::FailureRecorded { failures: 1 });
        assert!(window.lockout_expires_at.is_none());
    }

    #[test]
    fn status_reports_remaining_time() {
        let mut window = LockoutWindow::default();
        let start = Utc::now();
        for _ in 0..5 {
            window.record(start, false, None, &policy());
        }

        let status = window.status(start + Duration::minutes(10), policy().window);
        assert!(status.is_locked_out);
        assert_eq!(status.remaining_secs, 20 * 60);
        assert_eq!(status.failed_attempts, 5);

        let status = window.status(start + Duration::minutes(45), policy().window);
        assert!(!status.is_locked_out);
        assert_eq!(status.remaining_secs, 0);
    }

    #[test]
    fn policy_validation() {
        assert!(policy().validate().is_ok());
        let bad = LockoutPolicy {
            threshold: 0,
            ..policy()
        };
        assert!(bad.validate().is_err());
        let bad = LockoutPolicy {
            window: Duration::zero(),
            ..policy()
        };
        assert!(bad.validate().is_err());
    }
}
