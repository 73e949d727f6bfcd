//! Custody enforcement engine.
//!
//! Four cooperating components over shared collaborators:
//!
//! - [`LockStateMachine`]: UNLOCKED / SOFT / HARD transitions with
//!   dual-domain persistence and boot-time re-enforcement.
//! - [`LockoutTracker`]: sliding-window failed-attempt counting with a
//!   timed lockout, alerting, and escalation.
//! - [`OfflineCommandQueue`]: durable FIFO of undelivered commands.
//! - [`TamperMonitor`]: periodic integrity sampling that escalates into a
//!   TAMPER hard lock.
//!
//! [`Engine`] wires them together; [`CommandDispatcher`] and
//! [`UnlockCodeVerifier`] are the entry points for backend commands and
//! offline unlock codes. Detections and lockouts are also persisted in the
//! [`ViolationLog`].

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod lockout;
pub mod queue;
pub mod state_machine;
pub mod tamper_monitor;
pub mod unlock_code;
pub mod violations;

pub use dispatcher::{raised_locally, CommandDispatcher, DispatchOutcome, ServerCommand};
pub use engine::{Collaborators, Engine, EngineConfig};
pub use error::EngineError;
pub use lockout::LockoutTracker;
pub use queue::{DrainReport, OfflineCommandQueue};
pub use state_machine::{BootEnforcement, LockStateMachine};
pub use tamper_monitor::{
    CycleOutcome, EscalationPolicy, MonitorExit, TamperMonitor, TamperMonitorConfig,
};
pub use unlock_code::{hash_code, UnlockCodeVerifier, UnlockOutcome};
pub use violations::ViolationLog;
