//! Local control socket for the lock-screen UI.
//!
//! One JSON request per line, one JSON response per line, over a Unix
//! domain socket.
//!
//! ```text
//! {"op":"status"}
//! {"op":"unlock_attempt","code":"ABC123"}
//! {"op":"lockout_status"}
//! {"op":"violation_log"}
//! {"op":"clear_violation_log"}
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use custody_core::lock::LockRecord;
use custody_core::lockout::LockoutStatus;
use custody_core::violation::Violation;
use custody_engine::{Engine, EngineError, UnlockOutcome};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;

use crate::platform::{Screen, ScreenState, TrackedRestrictions};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    Status,
    UnlockAttempt { code: String },
    LockoutStatus,
    ViolationLog,
    ClearViolationLog,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ControlResponse {
    Status {
        record: LockRecord,
        screen: Screen,
        restrictions: Vec<&'static str>,
    },
    Unlock {
        outcome: UnlockOutcome,
    },
    Lockout {
        status: LockoutStatus,
    },
    Violations {
        entries: Vec<Violation>,
    },
    Cleared,
    Error {
        message: String,
    },
}

/// What the control socket reads and drives.
#[derive(Clone)]
pub struct ControlContext {
    pub engine: Arc<Engine>,
    pub screen: Arc<ScreenState>,
    pub restrictions: Arc<TrackedRestrictions>,
}

impl ControlContext {
    /// Parse and answer a single request line.
    pub async fn handle_line(&self, line: &str) -> ControlResponse {
        match serde_json::from_str::<ControlRequest>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => ControlResponse::Error {
                message: format!("invalid request: {e}"),
            },
        }
    }

    pub async fn handle(&self, request: ControlRequest) -> ControlResponse {
        let lock_id = self.engine.lock_id();
        match request {
            ControlRequest::Status => ControlResponse::Status {
                record: self.engine.state_machine().current_state().await,
                screen: self.screen.current(),
                restrictions: self.restrictions.active(),
            },
            ControlRequest::UnlockAttempt { code } => {
                match self.engine.unlock_codes().try_unlock(lock_id, &code).await {
                    Ok(outcome) => ControlResponse::Unlock { outcome },
                    Err(e) => error_response("Unlock attempt failed", e),
                }
            }
            ControlRequest::LockoutStatus => ControlResponse::Lockout {
                status: self.engine.lockout_tracker().get_lockout_status(lock_id).await,
            },
            ControlRequest::ViolationLog => match self.engine.violation_log().entries().await {
                Ok(entries) => ControlResponse::Violations { entries },
                Err(e) => error_response("Violation log unreadable", e),
            },
            ControlRequest::ClearViolationLog => match self.engine.violation_log().clear().await {
                Ok(()) => ControlResponse::Cleared,
                Err(e) => error_response("Violation log not cleared", e),
            },
        }
    }
}

fn error_response(context: &'static str, e: EngineError) -> ControlResponse {
    tracing::error!(error = %e, "{context}");
    ControlResponse::Error {
        message: e.to_string(),
    }
}

/// Bind `path`, replacing a stale socket file.
pub fn bind(path: &Path) -> std::io::Result<UnixListener> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    UnixListener::bind(path)
}

/// Accept connections until cancelled, then remove the socket file.
pub async fn serve(listener: UnixListener, path: PathBuf, ctx: ControlContext, cancel: CancellationToken) {
    tracing::info!(path = %path.display(), "Control socket listening");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let ctx = ctx.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, ctx, cancel).await {
                                tracing::debug!(error = %e, "Control connection closed with error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Control socket accept failed");
                    }
                }
            }
        }
    }

    if let Err(e) = std::fs::remove_file(&path) {
        tracing::debug!(error = %e, "Control socket file not removed");
    }
    tracing::info!("Control socket stopped");
}

async fn handle_connection(
    stream: UnixStream,
    ctx: ControlContext,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = ctx.handle_line(&line).await;
        let mut payload = serde_json::to_vec(&response).map_err(std::io::Error::other)?;
        payload.push(b'\n');
        writer.write_all(&payload).await?;
    }
}
