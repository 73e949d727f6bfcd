//! Failed-unlock lockout tracker.
//!
//! Wraps the pure [`LockoutWindow`] logic with persistence, alerting, and
//! escalation. Any bookkeeping fault fails open: a broken store must never
//! deny the legitimate unlock path.

use std::sync::Arc;

use custody_core::collaborators::CommandChannel;
use custody_core::command::CommandAction;
use custody_core::lock::LockType;
use custody_core::lockout::{AttemptDecision, LockoutPolicy, LockoutStatus};
use custody_core::violation::ViolationKind;
use custody_core::Clock;
use custody_events::bus::{CustodyEvent, EventBus, EVENT_LOCKOUT_STARTED};
use custody_store::repositories::LockoutRepo;
use custody_store::StoreError;
use tokio::sync::Mutex;

use crate::queue::OfflineCommandQueue;
use crate::state_machine::LockStateMachine;
use crate::violations::ViolationLog;

/// Reason recorded on the hard lock raised by a lockout.
pub const LOCKOUT_LOCK_REASON: &str = "too many failed unlock attempts";

pub struct LockoutTracker {
    repo: LockoutRepo,
    policy: LockoutPolicy,
    clock: Arc<dyn Clock>,
    channel: Arc<dyn CommandChannel>,
    queue: Arc<OfflineCommandQueue>,
    bus: Arc<EventBus>,
    escalation: Option<Arc<LockStateMachine>>,
    violations: Option<Arc<ViolationLog>>,
    /// Serializes read-modify-write of lockout windows.
    gate: Mutex<()>,
}

impl LockoutTracker {
    pub fn new(
        repo: LockoutRepo,
        policy: LockoutPolicy,
        clock: Arc<dyn Clock>,
        channel: Arc<dyn CommandChannel>,
        queue: Arc<OfflineCommandQueue>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            repo,
            policy,
            clock,
            channel,
            queue,
            bus,
            escalation: None,
            violations: None,
            gate: Mutex::new(()),
        }
    }

    /// Hard-lock through `state_machine` when a lockout starts on a device
    /// that is not already HARD.
    pub fn with_escalation(mut self, state_machine: Arc<LockStateMachine>) -> Self {
        self.escalation = Some(state_machine);
        self
    }

    /// Persist every started lockout to `log`.
    pub fn with_violation_log(mut self, log: Arc<ViolationLog>) -> Self {
        self.violations = Some(log);
        self
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Record an unlock attempt and return whether further attempts are
    /// allowed.
    ///
    /// The failure that reaches the threshold returns `false` and starts the
    /// lockout. Attempts during a lockout return `false` without being
    /// evaluated.
    pub async fn record_attempt(&self, lock_id: &str, success: bool, context: &str) -> bool {
        let decision = {
            let _guard = self.gate.lock().await;
            match self.evaluate(lock_id, success, context).await {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::error!(
                        lock_id,
                        success,
                        error = %e,
                        "Lockout bookkeeping failed, allowing attempt"
                    );
                    return true;
                }
            }
        };

        match decision {
            AttemptDecision::Accepted => {
                tracing::info!(lock_id, "Unlock attempt succeeded, lockout history cleared");
            }
            AttemptDecision::FailureRecorded { failures } => {
                tracing::info!(
                    lock_id,
                    failures,
                    threshold = self.policy.threshold,
                    context,
                    "Failed unlock attempt recorded"
                );
            }
            AttemptDecision::Rejected { expires_at } => {
                tracing::warn!(
                    lock_id,
                    %expires_at,
                    "Unlock attempt rejected, lockout in force"
                );
            }
            AttemptDecision::LockoutStarted {
                failures,
                expires_at,
            } => {
                tracing::warn!(lock_id, failures, %expires_at, context, "Lockout started");
                self.on_lockout(lock_id, failures, context).await;
            }
        }

        decision.allowed()
    }

    /// Current lockout state for `lock_id`. An expired lockout key is
    /// removed from storage as a side effect.
    pub async fn get_lockout_status(&self, lock_id: &str) -> LockoutStatus {
        let _guard = self.gate.lock().await;
        let now = self.clock.now();

        let window = match self.repo.find(lock_id).await {
            Ok(Some(window)) => window,
            Ok(None) => return LockoutStatus::clear(),
            Err(e) => {
                tracing::error!(lock_id, error = %e, "Failed to read lockout status");
                return LockoutStatus::clear();
            }
        };

        if window.lockout_expired(now) {
            if let Err(e) = self.repo.clear(lock_id).await {
                tracing::warn!(lock_id, error = %e, "Failed to clear expired lockout");
            }
            return LockoutStatus::clear();
        }

        window.status(now, self.policy.window)
    }

    // ---- private helpers ----

    async fn evaluate(
        &self,
        lock_id: &str,
        success: bool,
        context: &str,
    ) -> Result<AttemptDecision, StoreError> {
        let now = self.clock.now();
        let mut window = self.repo.find(lock_id).await?.unwrap_or_default();
        let context = (!context.is_empty()).then_some(context);
        let decision = window.record(now, success, context, &self.policy);
        self.repo.save(lock_id, &window).await?;
        Ok(decision)
    }

    /// Alert the backend (queueing the alert when it cannot be delivered),
    /// publish the event, and escalate.
    async fn on_lockout(&self, lock_id: &str, failures: u32, context: &str) {
        let reason = format!(
            "suspicious activity: {failures} failed unlock attempts for {lock_id} (last: {context})"
        );

        self.bus.publish(
            CustodyEvent::new(EVENT_LOCKOUT_STARTED)
                .with_lock_id(lock_id)
                .with_payload(serde_json::json!({
                    "failed_attempts": failures,
                    "context": context,
                    "lockout_minutes": self.policy.lockout_duration.num_minutes(),
                })),
        );

        if let Some(log) = &self.violations {
            log.record(ViolationKind::Lockout, &reason).await;
        }

        if let Err(e) = self.channel.deliver(CommandAction::Alert, &reason).await {
            tracing::warn!(lock_id, error = %e, "Lockout alert not delivered, queueing");
            if let Err(e) = self.queue.enqueue(CommandAction::Alert, &reason).await {
                tracing::error!(lock_id, error = %e, "Failed to queue lockout alert");
            }
        }

        if let Some(state_machine) = &self.escalation {
            if state_machine.current_state().await.is_hard() {
                return;
            }
            if let Err(e) = state_machine
                .apply_hard_lock(LOCKOUT_LOCK_REASON, LockType::Generic, None)
                .await
            {
                tracing::error!(lock_id, error = %e, "Lockout escalation failed");
            }
        }
    }
}
