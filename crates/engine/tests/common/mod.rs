//! Test doubles shared by the engine integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use custody_core::collaborators::{
    CommandChannel, DeliveryError, EnforcementError, IntegritySource, PresentationSurface,
    RestrictionSurface, SignalError,
};
use custody_core::command::CommandAction;
use custody_core::lock::LockType;
use custody_core::lockout::LockoutPolicy;
use custody_core::restriction::Restriction;
use custody_core::ManualClock;
use custody_engine::{Collaborators, Engine, EngineConfig, TamperMonitorConfig};
use custody_events::EventBus;
use custody_store::{MemoryStore, StorageDomain};

pub const LOCK_ID: &str = "device-lock";

pub fn allowed_packages() -> Vec<String> {
    vec!["com.android.phone".to_string(), "com.custody.agent".to_string()]
}

// ---------------------------------------------------------------------------
// Restriction surface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestrictionCall {
    Enforce(&'static str),
    Release(&'static str),
}

/// Records every enforce/release call. Restrictions named in `failing` error.
#[derive(Default)]
pub struct RecordingRestrictions {
    calls: Mutex<Vec<RestrictionCall>>,
    failing: Mutex<Vec<&'static str>>,
}

impl RecordingRestrictions {
    pub fn calls(&self) -> Vec<RestrictionCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn enforce_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RestrictionCall::Enforce(_)))
            .count()
    }

    pub fn release_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, RestrictionCall::Release(_)))
            .count()
    }

    pub fn fail_on(&self, name: &'static str) {
        self.failing.lock().unwrap().push(name);
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn record(&self, call: RestrictionCall, name: &'static str, operation: &'static str) -> Result<(), EnforcementError> {
        self.calls.lock().unwrap().push(call);
        if self.failing.lock().unwrap().contains(&name) {
            return Err(EnforcementError {
                operation,
                restriction: name,
                message: "scripted failure".into(),
            });
        }
        Ok(())
    }
}

impl RestrictionSurface for RecordingRestrictions {
    fn enforce(&self, restriction: &Restriction) -> Result<(), EnforcementError> {
        let name = restriction.name();
        self.record(RestrictionCall::Enforce(name), name, "enforce")
    }

    fn release(&self, restriction: &Restriction) -> Result<(), EnforcementError> {
        let name = restriction.name();
        self.record(RestrictionCall::Release(name), name, "release")
    }
}

// ---------------------------------------------------------------------------
// Presentation surface
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Lock(String, LockType),
    Warning(String),
    Dismissed,
}

#[derive(Default)]
pub struct RecordingPresentation {
    screens: Mutex<Vec<Screen>>,
}

impl RecordingPresentation {
    pub fn screens(&self) -> Vec<Screen> {
        self.screens.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<Screen> {
        self.screens.lock().unwrap().last().cloned()
    }
}

impl PresentationSurface for RecordingPresentation {
    fn show_lock(&self, reason: &str, lock_type: LockType) {
        self.screens
            .lock()
            .unwrap()
            .push(Screen::Lock(reason.to_string(), lock_type));
    }

    fn show_warning(&self, reason: &str) {
        self.screens
            .lock()
            .unwrap()
            .push(Screen::Warning(reason.to_string()));
    }

    fn dismiss(&self) {
        self.screens.lock().unwrap().push(Screen::Dismissed);
    }
}

// ---------------------------------------------------------------------------
// Command channel
// ---------------------------------------------------------------------------

/// Records deliveries; fails them while offline or when the reason is
/// listed in `failing`.
#[derive(Default)]
pub struct ScriptedChannel {
    offline: Mutex<bool>,
    failing: Mutex<Vec<String>>,
    delivered: Mutex<Vec<(CommandAction, String)>>,
    attempts: Mutex<usize>,
}

impl ScriptedChannel {
    pub fn offline() -> Self {
        let channel = Self::default();
        channel.set_offline(true);
        channel
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    pub fn fail_reason(&self, reason: &str) {
        self.failing.lock().unwrap().push(reason.to_string());
    }

    pub fn delivered(&self) -> Vec<(CommandAction, String)> {
        self.delivered.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl CommandChannel for ScriptedChannel {
    async fn deliver(&self, action: CommandAction, reason: &str) -> Result<(), DeliveryError> {
        *self.attempts.lock().unwrap() += 1;
        if *self.offline.lock().unwrap() {
            return Err(DeliveryError::Offline);
        }
        if self.failing.lock().unwrap().iter().any(|r| r == reason) {
            return Err(DeliveryError::HttpStatus(503));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((action, reason.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Integrity source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Signals {
    pub bootloader_locked: Option<bool>,
    pub bootloader_id: Option<String>,
    pub usb_debugging: Option<bool>,
    pub developer_mode: Option<bool>,
}

impl Signals {
    pub fn locked(id: &str) -> Self {
        Self {
            bootloader_locked: Some(true),
            bootloader_id: Some(id.to_string()),
            usb_debugging: Some(false),
            developer_mode: Some(false),
        }
    }

    pub fn unlocked(id: &str) -> Self {
        Self {
            bootloader_locked: Some(false),
            ..Self::locked(id)
        }
    }
}

/// Serves one scripted sample per cycle; the last one repeats.
///
/// Each read of `bootloader_locked` (the first signal sampled in a cycle)
/// moves to the next sample.
pub struct ScriptedIntegritySource {
    samples: Mutex<VecDeque<Signals>>,
    current: Mutex<Signals>,
}

impl ScriptedIntegritySource {
    pub fn new(samples: Vec<Signals>) -> Self {
        let first = samples.first().cloned().expect("at least one sample");
        Self {
            samples: Mutex::new(samples.into()),
            current: Mutex::new(first),
        }
    }

    fn read<T>(&self, pick: impl Fn(&Signals) -> Option<T>) -> Result<T, SignalError> {
        pick(&self.current.lock().unwrap())
            .ok_or_else(|| SignalError::Unavailable("scripted".into()))
    }
}

#[async_trait]
impl IntegritySource for ScriptedIntegritySource {
    async fn bootloader_locked(&self) -> Result<bool, SignalError> {
        if let Some(next) = self.samples.lock().unwrap().pop_front() {
            *self.current.lock().unwrap() = next;
        }
        self.read(|s| s.bootloader_locked)
    }

    async fn bootloader_id(&self) -> Result<String, SignalError> {
        self.read(|s| s.bootloader_id.clone())
    }

    async fn usb_debugging(&self) -> Result<bool, SignalError> {
        self.read(|s| s.usb_debugging)
    }

    async fn developer_mode(&self) -> Result<bool, SignalError> {
        self.read(|s| s.developer_mode)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// A fully wired engine over in-memory stores and recording doubles.
pub struct Harness {
    pub boot: Arc<MemoryStore>,
    pub session: Arc<MemoryStore>,
    pub channel: Arc<ScriptedChannel>,
    pub restrictions: Arc<RecordingRestrictions>,
    pub presentation: Arc<RecordingPresentation>,
    pub clock: Arc<ManualClock>,
    pub bus: Arc<EventBus>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            boot: Arc::new(MemoryStore::new(StorageDomain::Boot)),
            session: Arc::new(MemoryStore::new(StorageDomain::Session)),
            channel: Arc::new(ScriptedChannel::default()),
            restrictions: Arc::new(RecordingRestrictions::default()),
            presentation: Arc::new(RecordingPresentation::default()),
            clock: Arc::new(ManualClock::new(
                Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
            )),
            bus: Arc::new(EventBus::default()),
        }
    }

    pub fn config() -> EngineConfig {
        EngineConfig {
            lock_id: LOCK_ID.to_string(),
            lockout: LockoutPolicy::default(),
            tamper: TamperMonitorConfig::default(),
            allowed_packages: allowed_packages(),
        }
    }

    /// Start an engine against this harness. Calling it again simulates a
    /// process restart: the boot store persists, restrictions start fresh.
    pub async fn start(&self) -> Engine {
        self.start_with(Self::config()).await
    }

    pub async fn start_with(&self, config: EngineConfig) -> Engine {
        Engine::start(config, self.collaborators())
            .await
            .expect("engine should start")
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            boot_store: self.boot.clone(),
            session_store: self.session.clone(),
            channel: self.channel.clone(),
            restrictions: self.restrictions.clone(),
            presentation: self.presentation.clone(),
            clock: self.clock.clone(),
            bus: self.bus.clone(),
        }
    }
}
