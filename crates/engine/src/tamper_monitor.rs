//! Tamper/bootloader monitor.
//!
//! A long-running loop that samples the integrity signals every cycle,
//! compares each sample with the previous one, and escalates into the
//! [`LockStateMachine`] with a TAMPER hard lock. The loop is cooperative:
//! it sleeps in `tokio::select!` against a [`CancellationToken`], and what
//! happens after an escalation is decided by [`EscalationPolicy`].

use std::sync::Arc;
use std::time::Duration;

use custody_core::collaborators::{IntegritySource, SignalError};
use custody_core::lock::{LockType, TamperType};
use custody_core::tamper::{evaluate, normalize_identifier, TamperSnapshot, TamperVerdict};
use custody_core::violation::ViolationKind;
use custody_core::Clock;
use custody_events::bus::{
    CustodyEvent, EventBus, EVENT_TAMPER_DETECTED, EVENT_TAMPER_SUSPICIOUS,
};
use custody_store::repositories::SettingsRepo;
use tokio_util::sync::CancellationToken;

use crate::state_machine::LockStateMachine;
use crate::violations::ViolationLog;

/// Default interval between cycles.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

/// Interval while device setup is in progress.
pub const DEFAULT_SETUP_INTERVAL: Duration = Duration::from_secs(60);

/// What the monitor does after it has raised a hard lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscalationPolicy {
    /// End the loop. A fresh monitor starts on the next process start.
    #[default]
    StopMonitoring,
    /// Keep sampling. Repeats of an escalation already in force are
    /// suppressed.
    ContinueMonitoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TamperMonitorConfig {
    pub interval: Duration,
    pub setup_interval: Duration,
    pub escalation_policy: EscalationPolicy,
    /// Hard-lock when USB debugging or developer mode turns on.
    pub lock_on_debug: bool,
}

impl Default for TamperMonitorConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            setup_interval: DEFAULT_SETUP_INTERVAL,
            escalation_policy: EscalationPolicy::default(),
            lock_on_debug: false,
        }
    }
}

/// Result of a single monitoring cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Setup in progress (or its flag unreadable); nothing sampled.
    SkippedSetup,
    Clean,
    Suspicious(TamperType),
    Escalated(TamperType),
    /// The same tamper lock is already in force.
    EscalationSuppressed(TamperType),
    /// The hard lock could not be persisted; retried next cycle.
    EscalationFailed(TamperType),
}

/// Why [`TamperMonitor::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    Cancelled,
    Escalated(TamperType),
}

pub struct TamperMonitor {
    source: Arc<dyn IntegritySource>,
    state_machine: Arc<LockStateMachine>,
    settings: Arc<SettingsRepo>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    config: TamperMonitorConfig,
    violations: Option<Arc<ViolationLog>>,
    /// The immediately preceding sample. Only this monitor writes it.
    baseline: Option<TamperSnapshot>,
}

impl TamperMonitor {
    pub fn new(
        source: Arc<dyn IntegritySource>,
        state_machine: Arc<LockStateMachine>,
        settings: Arc<SettingsRepo>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        config: TamperMonitorConfig,
    ) -> Self {
        Self {
            source,
            state_machine,
            settings,
            bus,
            clock,
            config,
            violations: None,
            baseline: None,
        }
    }

    /// Persist detections and suspicious changes to `log`.
    pub fn with_violation_log(mut self, log: Arc<ViolationLog>) -> Self {
        self.violations = Some(log);
        self
    }

    pub fn baseline(&self) -> Option<&TamperSnapshot> {
        self.baseline.as_ref()
    }

    /// Run cycles until cancelled or, under
    /// [`EscalationPolicy::StopMonitoring`], until a hard lock is raised.
    pub async fn run(mut self, cancel: CancellationToken) -> MonitorExit {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            policy = ?self.config.escalation_policy,
            "Tamper monitor started"
        );

        loop {
            let outcome = self.cycle().await;

            if let CycleOutcome::Escalated(tamper_type) = outcome {
                if self.config.escalation_policy == EscalationPolicy::StopMonitoring {
                    tracing::info!(
                        tamper_type = tamper_type.as_str(),
                        "Tamper monitor stopping after escalation"
                    );
                    return MonitorExit::Escalated(tamper_type);
                }
            }

            let delay = match outcome {
                CycleOutcome::SkippedSetup => self.config.setup_interval,
                _ => self.config.interval,
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Tamper monitor cancelled");
                    return MonitorExit::Cancelled;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One sample-compare-escalate step.
    pub async fn cycle(&mut self) -> CycleOutcome {
        match self.settings.setup_in_progress().await {
            Ok(false) => {}
            Ok(true) => {
                tracing::debug!("Setup in progress, tamper cycle skipped");
                return CycleOutcome::SkippedSetup;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Setup flag unreadable, tamper cycle skipped");
                return CycleOutcome::SkippedSetup;
            }
        }

        let current = self.sample().await;
        let verdict = evaluate(self.baseline.as_ref(), &current, self.config.lock_on_debug);

        match verdict {
            TamperVerdict::Clean => {
                self.baseline = Some(current);
                CycleOutcome::Clean
            }
            TamperVerdict::Suspicious {
                tamper_type,
                reason,
            } => {
                tracing::warn!(tamper_type = tamper_type.as_str(), reason = %reason, "Suspicious integrity change");
                self.publish(EVENT_TAMPER_SUSPICIOUS, tamper_type, &reason, &current);
                self.log_violation(ViolationKind::SuspiciousChange, tamper_type, &reason)
                    .await;
                self.baseline = Some(current);
                CycleOutcome::Suspicious(tamper_type)
            }
            TamperVerdict::Escalate {
                tamper_type,
                reason,
            } => self.escalate(tamper_type, &reason, current).await,
        }
    }

    // ---- private helpers ----

    async fn escalate(
        &mut self,
        tamper_type: TamperType,
        reason: &str,
        current: TamperSnapshot,
    ) -> CycleOutcome {
        if self.config.escalation_policy == EscalationPolicy::ContinueMonitoring {
            let record = self.state_machine.current_state().await;
            if record.is_hard()
                && record.lock_type == Some(LockType::Tamper)
                && record.tamper_type == Some(tamper_type)
            {
                self.baseline = Some(current);
                return CycleOutcome::EscalationSuppressed(tamper_type);
            }
        }

        tracing::error!(tamper_type = tamper_type.as_str(), reason, "Tamper detected, escalating to hard lock");
        self.publish(EVENT_TAMPER_DETECTED, tamper_type, reason, &current);
        self.log_violation(ViolationKind::TamperDetected, tamper_type, reason)
            .await;

        match self
            .state_machine
            .apply_hard_lock(reason, LockType::Tamper, Some(tamper_type))
            .await
        {
            Ok(_) => {}
            Err(e) if e.transition_applied() => {
                tracing::warn!(error = %e, "Tamper lock applied with stale session store");
            }
            Err(e) => {
                // Baseline is kept so the next cycle detects the change again.
                tracing::error!(error = %e, "Tamper lock could not be applied");
                return CycleOutcome::EscalationFailed(tamper_type);
            }
        }

        self.baseline = Some(current);
        CycleOutcome::Escalated(tamper_type)
    }

    async fn sample(&self) -> TamperSnapshot {
        TamperSnapshot {
            bootloader_locked: known("bootloader_locked", self.source.bootloader_locked().await),
            bootloader_id: known("bootloader_id", self.source.bootloader_id().await)
                .and_then(|raw| normalize_identifier(&raw)),
            usb_debugging: known("usb_debugging", self.source.usb_debugging().await),
            developer_mode: known("developer_mode", self.source.developer_mode().await),
            sampled_at: self.clock.now(),
        }
    }

    async fn log_violation(&self, kind: ViolationKind, tamper_type: TamperType, reason: &str) {
        if let Some(log) = &self.violations {
            log.record(kind, &format!("{}: {reason}", tamper_type.as_str()))
                .await;
        }
    }

    fn publish(&self, event_type: &str, tamper_type: TamperType, reason: &str, sample: &TamperSnapshot) {
        self.bus.publish(
            CustodyEvent::new(event_type)
                .with_lock_id(self.state_machine.lock_id())
                .with_payload(serde_json::json!({
                    "tamper_type": tamper_type,
                    "reason": reason,
                    "sample": sample,
                })),
        );
    }
}

/// An unreadable signal is "unknown".
fn known<T>(signal: &'static str, read: Result<T, SignalError>) -> Option<T> {
    match read {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(signal, error = %e, "Integrity signal unknown");
            None
        }
    }
}
