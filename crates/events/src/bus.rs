//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`CustodyEvent`]s. It is
//! shared via `Arc<EventBus>` between the engine components and whatever
//! observes them (logging, the control socket, tests).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Event type names
// ---------------------------------------------------------------------------

pub const EVENT_LOCK_HARD: &str = "lock.hard";
pub const EVENT_LOCK_SOFT: &str = "lock.soft";
pub const EVENT_LOCK_UNLOCKED: &str = "lock.unlocked";
pub const EVENT_LOCK_REENFORCED: &str = "lock.reenforced";
pub const EVENT_LOCKOUT_STARTED: &str = "lockout.started";
pub const EVENT_ALERT_RECEIVED: &str = "alert.received";
pub const EVENT_TAMPER_DETECTED: &str = "tamper.detected";
pub const EVENT_TAMPER_SUSPICIOUS: &str = "tamper.suspicious";
pub const EVENT_QUEUE_DRAINED: &str = "queue.drained";
pub const EVENT_QUEUE_DELIVERY_FAILED: &str = "queue.delivery_failed";

// ---------------------------------------------------------------------------
// CustodyEvent
// ---------------------------------------------------------------------------

/// Something that happened inside the custody engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustodyEvent {
    /// Dot-separated event name, e.g. `"lock.hard"`.
    pub event_type: String,

    /// Lock subject the event concerns, when there is one.
    pub lock_id: Option<String>,

    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl CustodyEvent {
    /// Create an event with an empty payload.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            lock_id: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_lock_id(mut self, lock_id: impl Into<String>) -> Self {
        self.lock_id = Some(lock_id.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out event bus.
///
/// ```rust
/// use custody_events::bus::{CustodyEvent, EventBus, EVENT_LOCK_HARD};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(CustodyEvent::new(EVENT_LOCK_HARD));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<CustodyEvent>,
}

impl EventBus {
    /// When the buffer is full, the oldest un-consumed events are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all current subscribers. Never blocks, never fails.
    pub fn publish(&self, event: CustodyEvent) {
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CustodyEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Event logging
// ---------------------------------------------------------------------------

/// Log every event until the bus is dropped.
///
/// Spawned by the agent so that each custody event leaves a structured
/// log line even when nothing else subscribes.
pub async fn log_events(mut receiver: broadcast::Receiver<CustodyEvent>) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                tracing::info!(
                    event_type = %event.event_type,
                    lock_id = ?event.lock_id,
                    payload = %event.payload,
                    "Custody event"
                );
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Event logger lagged, some events were not logged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::debug!("Event bus closed, event logger shutting down");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
