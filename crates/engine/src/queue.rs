//! Offline command queue.
//!
//! Commands that cannot reach the backend are appended to a durable FIFO
//! log and replayed by [`OfflineCommandQueue::drain`] when connectivity
//! returns. Each drain is one best-effort pass: every snapshotted entry is
//! attempted once, in order, and the snapshot is removed afterwards whether
//! or not its delivery succeeded. Entries enqueued while a drain is in
//! flight are not part of its snapshot and survive for the next drain.

use std::sync::Arc;

use custody_core::collaborators::CommandChannel;
use custody_core::command::{CommandAction, QueuedCommand};
use custody_core::Clock;
use custody_events::bus::{
    CustodyEvent, EventBus, EVENT_QUEUE_DELIVERY_FAILED, EVENT_QUEUE_DRAINED,
};
use custody_store::repositories::CommandQueueRepo;
use tokio::sync::Mutex;

use crate::error::EngineError;

/// Outcome of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: usize,
    pub delivered: usize,
    /// Entries whose delivery failed. They are no longer queued.
    pub failed: Vec<QueuedCommand>,
}

pub struct OfflineCommandQueue {
    repo: CommandQueueRepo,
    clock: Arc<dyn Clock>,
    bus: Arc<EventBus>,
    /// Guards read-modify-write of the stored log.
    write_gate: Mutex<()>,
    /// At most one drain at a time.
    drain_gate: Mutex<()>,
}

impl OfflineCommandQueue {
    pub fn new(repo: CommandQueueRepo, clock: Arc<dyn Clock>, bus: Arc<EventBus>) -> Self {
        Self {
            repo,
            clock,
            bus,
            write_gate: Mutex::new(()),
            drain_gate: Mutex::new(()),
        }
    }

    /// Append a command. Only persistence is attempted, never delivery.
    pub async fn enqueue(
        &self,
        action: CommandAction,
        reason: &str,
    ) -> Result<QueuedCommand, EngineError> {
        let command = QueuedCommand::new(action, reason, self.clock.now());
        let _guard = self.write_gate.lock().await;
        self.repo.append(command.clone()).await?;
        tracing::info!(
            id = %command.id,
            action = action.as_str(),
            reason,
            "Command queued for later delivery"
        );
        Ok(command)
    }

    /// Queued entries, oldest first.
    pub async fn pending(&self) -> Result<Vec<QueuedCommand>, EngineError> {
        let _guard = self.write_gate.lock().await;
        Ok(self.repo.list().await?)
    }

    /// Attempt delivery of every queued entry in enqueue order, then remove
    /// them all.
    ///
    /// Individual delivery failures are logged and reported but never stop
    /// the pass. Only a storage fault returns `Err`; if it happens after
    /// delivery the entries stay queued.
    pub async fn drain(&self, channel: &dyn CommandChannel) -> Result<DrainReport, EngineError> {
        let _drain = self.drain_gate.lock().await;

        let snapshot = {
            let _guard = self.write_gate.lock().await;
            self.repo.list().await?
        };
        if snapshot.is_empty() {
            return Ok(DrainReport::default());
        }

        let mut report = DrainReport {
            attempted: snapshot.len(),
            ..DrainReport::default()
        };

        for command in &snapshot {
            match channel.deliver(command.action, &command.reason).await {
                Ok(()) => {
                    report.delivered += 1;
                    tracing::debug!(id = %command.id, action = command.action.as_str(), "Queued command delivered");
                }
                Err(e) => {
                    tracing::warn!(
                        id = %command.id,
                        action = command.action.as_str(),
                        reason = %command.reason,
                        error = %e,
                        "Queued command delivery failed, dropping"
                    );
                    self.bus.publish(
                        CustodyEvent::new(EVENT_QUEUE_DELIVERY_FAILED).with_payload(
                            serde_json::json!({
                                "id": command.id,
                                "action": command.action,
                                "reason": command.reason,
                                "enqueued_at": command.enqueued_at,
                                "error": e.to_string(),
                            }),
                        ),
                    );
                    report.failed.push(command.clone());
                }
            }
        }

        {
            let _guard = self.write_gate.lock().await;
            self.repo.remove_oldest(snapshot.len()).await?;
        }

        tracing::info!(
            attempted = report.attempted,
            delivered = report.delivered,
            failed = report.failed.len(),
            "Offline queue drained"
        );
        self.bus.publish(
            CustodyEvent::new(EVENT_QUEUE_DRAINED).with_payload(serde_json::json!({
                "attempted": report.attempted,
                "delivered": report.delivered,
                "failed": report.failed.len(),
            })),
        );

        Ok(report)
    }
}
