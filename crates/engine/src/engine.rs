//! Wiring of the four engine components around shared collaborators.

use std::sync::Arc;

use custody_core::collaborators::{
    CommandChannel, IntegritySource, PresentationSurface, RestrictionSurface,
};
use custody_core::lockout::LockoutPolicy;
use custody_core::Clock;
use custody_events::EventBus;
use custody_store::repositories::{
    CommandQueueRepo, LockRecordRepo, LockoutRepo, SettingsRepo, ViolationLogRepo,
};
use custody_store::KeyValueStore;

use crate::dispatcher::CommandDispatcher;
use crate::error::EngineError;
use crate::lockout::LockoutTracker;
use crate::queue::{DrainReport, OfflineCommandQueue};
use crate::state_machine::{BootEnforcement, LockStateMachine};
use crate::tamper_monitor::{TamperMonitor, TamperMonitorConfig};
use crate::unlock_code::UnlockCodeVerifier;
use crate::violations::ViolationLog;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Identity of the lock this engine guards (one per device).
    pub lock_id: String,
    pub lockout: LockoutPolicy,
    pub tamper: TamperMonitorConfig,
    /// Packages that stay runnable under a hard lock.
    pub allowed_packages: Vec<String>,
}

/// Everything the engine drives but does not own.
pub struct Collaborators {
    /// Survives a reboot before first unlock. Authoritative.
    pub boot_store: Arc<dyn KeyValueStore>,
    pub session_store: Arc<dyn KeyValueStore>,
    pub channel: Arc<dyn CommandChannel>,
    pub restrictions: Arc<dyn RestrictionSurface>,
    pub presentation: Arc<dyn PresentationSurface>,
    pub clock: Arc<dyn Clock>,
    pub bus: Arc<EventBus>,
}

pub struct Engine {
    config: EngineConfig,
    state_machine: Arc<LockStateMachine>,
    tracker: Arc<LockoutTracker>,
    queue: Arc<OfflineCommandQueue>,
    dispatcher: Arc<CommandDispatcher>,
    unlock_codes: Arc<UnlockCodeVerifier>,
    settings: Arc<SettingsRepo>,
    violations: Arc<ViolationLog>,
    channel: Arc<dyn CommandChannel>,
    clock: Arc<dyn Clock>,
    bus: Arc<EventBus>,
    boot: BootEnforcement,
}

impl Engine {
    /// Build the engine and re-establish enforcement from the boot store.
    pub async fn start(config: EngineConfig, deps: Collaborators) -> Result<Self, EngineError> {
        config.lockout.validate()?;

        let Collaborators {
            boot_store,
            session_store,
            channel,
            restrictions,
            presentation,
            clock,
            bus,
        } = deps;

        let state_machine = Arc::new(
            LockStateMachine::load(
                config.lock_id.clone(),
                LockRecordRepo::new(Arc::clone(&boot_store), session_store),
                restrictions,
                presentation,
                Arc::clone(&bus),
                Arc::clone(&clock),
                config.allowed_packages.clone(),
            )
            .await?,
        );

        let queue = Arc::new(OfflineCommandQueue::new(
            CommandQueueRepo::new(Arc::clone(&boot_store)),
            Arc::clone(&clock),
            Arc::clone(&bus),
        ));

        let violations = Arc::new(ViolationLog::new(
            ViolationLogRepo::new(Arc::clone(&boot_store)),
            Arc::clone(&clock),
        ));

        let tracker = Arc::new(
            LockoutTracker::new(
                LockoutRepo::new(Arc::clone(&boot_store)),
                config.lockout,
                Arc::clone(&clock),
                Arc::clone(&channel),
                Arc::clone(&queue),
                Arc::clone(&bus),
            )
            .with_escalation(Arc::clone(&state_machine))
            .with_violation_log(Arc::clone(&violations)),
        );

        let settings = Arc::new(SettingsRepo::new(boot_store));
        let dispatcher = Arc::new(CommandDispatcher::new(
            Arc::clone(&state_machine),
            Arc::clone(&bus),
        ));
        let unlock_codes = Arc::new(UnlockCodeVerifier::new(
            Arc::clone(&settings),
            Arc::clone(&tracker),
            Arc::clone(&state_machine),
        ));

        let boot = state_machine.check_and_enforce_on_boot().await?;
        tracing::info!(lock_id = %config.lock_id, boot = ?boot, "Custody engine started");

        Ok(Self {
            config,
            state_machine,
            tracker,
            queue,
            dispatcher,
            unlock_codes,
            settings,
            violations,
            channel,
            clock,
            bus,
            boot,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn lock_id(&self) -> &str {
        &self.config.lock_id
    }

    /// What the boot check did during [`start`](Self::start).
    pub fn boot_enforcement(&self) -> BootEnforcement {
        self.boot
    }

    pub fn state_machine(&self) -> &Arc<LockStateMachine> {
        &self.state_machine
    }

    pub fn lockout_tracker(&self) -> &Arc<LockoutTracker> {
        &self.tracker
    }

    pub fn queue(&self) -> &Arc<OfflineCommandQueue> {
        &self.queue
    }

    pub fn dispatcher(&self) -> &Arc<CommandDispatcher> {
        &self.dispatcher
    }

    pub fn unlock_codes(&self) -> &Arc<UnlockCodeVerifier> {
        &self.unlock_codes
    }

    pub fn settings(&self) -> &Arc<SettingsRepo> {
        &self.settings
    }

    pub fn violation_log(&self) -> &Arc<ViolationLog> {
        &self.violations
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// A monitor over `source`. The caller spawns [`TamperMonitor::run`].
    pub fn tamper_monitor(&self, source: Arc<dyn IntegritySource>) -> TamperMonitor {
        TamperMonitor::new(
            source,
            Arc::clone(&self.state_machine),
            Arc::clone(&self.settings),
            Arc::clone(&self.bus),
            Arc::clone(&self.clock),
            self.config.tamper,
        )
        .with_violation_log(Arc::clone(&self.violations))
    }

    /// Drain the offline queue through the engine's command channel.
    pub async fn drain_queue(&self) -> Result<DrainReport, EngineError> {
        self.queue.drain(self.channel.as_ref()).await
    }
}
