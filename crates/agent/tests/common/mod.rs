#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use custody_agent::connectivity::ReachabilityProbe;
use custody_agent::platform::{ScreenState, TrackedRestrictions};
use custody_core::collaborators::{CommandChannel, DeliveryError, IntegritySource, SignalError};
use custody_core::command::CommandAction;
use custody_core::ManualClock;
use custody_engine::{Collaborators, Engine, EngineConfig, TamperMonitorConfig};
use custody_events::EventBus;
use custody_store::{MemoryStore, StorageDomain};

pub const DEVICE_ID: &str = "dev-7";

/// Channel that counts deliveries and fails while offline.
#[derive(Default)]
pub struct CountingChannel {
    pub offline: AtomicBool,
    pub delivered: AtomicUsize,
}

#[async_trait]
impl CommandChannel for CountingChannel {
    async fn deliver(&self, _action: CommandAction, _reason: &str) -> Result<(), DeliveryError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DeliveryError::Offline);
        }
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Probe whose answer is set by the test.
#[derive(Default)]
pub struct SwitchProbe {
    pub online: AtomicBool,
}

impl SwitchProbe {
    pub fn set(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl ReachabilityProbe for SwitchProbe {
    async fn reachable(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Integrity signals fixed by the test. `None` reads as unavailable.
#[derive(Default)]
pub struct FixedIntegrity {
    pub bootloader_locked: Option<bool>,
    pub bootloader_id: Option<String>,
    pub usb_debugging: Option<bool>,
    pub developer_mode: Option<bool>,
}

fn fixed<T: Clone>(value: &Option<T>) -> Result<T, SignalError> {
    value
        .clone()
        .ok_or_else(|| SignalError::Unavailable("fixed".into()))
}

#[async_trait]
impl IntegritySource for FixedIntegrity {
    async fn bootloader_locked(&self) -> Result<bool, SignalError> {
        fixed(&self.bootloader_locked)
    }

    async fn bootloader_id(&self) -> Result<String, SignalError> {
        fixed(&self.bootloader_id)
    }

    async fn usb_debugging(&self) -> Result<bool, SignalError> {
        fixed(&self.usb_debugging)
    }

    async fn developer_mode(&self) -> Result<bool, SignalError> {
        fixed(&self.developer_mode)
    }
}

pub struct Agent {
    pub engine: Arc<Engine>,
    pub channel: Arc<CountingChannel>,
    pub screen: Arc<ScreenState>,
    pub restrictions: Arc<TrackedRestrictions>,
    pub clock: Arc<ManualClock>,
}

pub async fn start_agent() -> Agent {
    let channel = Arc::new(CountingChannel::default());
    let screen = Arc::new(ScreenState::default());
    let restrictions = Arc::new(TrackedRestrictions::default());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
    ));

    let engine = Engine::start(
        EngineConfig {
            lock_id: DEVICE_ID.to_string(),
            lockout: Default::default(),
            tamper: TamperMonitorConfig::default(),
            allowed_packages: vec!["com.android.phone".to_string()],
        },
        Collaborators {
            boot_store: Arc::new(MemoryStore::new(StorageDomain::Boot)),
            session_store: Arc::new(MemoryStore::new(StorageDomain::Session)),
            channel: channel.clone(),
            restrictions: restrictions.clone(),
            presentation: screen.clone(),
            clock: clock.clone(),
            bus: Arc::new(EventBus::default()),
        },
    )
    .await
    .expect("engine should start");

    Agent {
        engine: Arc::new(engine),
        channel,
        screen,
        restrictions,
        clock,
    }
}
