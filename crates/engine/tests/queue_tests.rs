mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use custody_core::collaborators::{CommandChannel, DeliveryError};
use custody_core::command::CommandAction;
use custody_engine::OfflineCommandQueue;
use custody_events::bus::{EVENT_QUEUE_DELIVERY_FAILED, EVENT_QUEUE_DRAINED};

use common::{Harness, ScriptedChannel};

#[tokio::test]
async fn drain_delivers_in_enqueue_order_and_empties_the_queue() {
    let h = Harness::new();
    let engine = h.start().await;
    let queue = engine.queue();

    queue.enqueue(CommandAction::Alert, "first").await.unwrap();
    queue.enqueue(CommandAction::Lock, "second").await.unwrap();
    queue.enqueue(CommandAction::Alert, "third").await.unwrap();

    let report = engine.drain_queue().await.unwrap();
    assert_eq!(report.attempted, 3);
    assert_eq!(report.delivered, 3);
    assert!(report.failed.is_empty());

    let reasons: Vec<_> = h.channel.delivered().into_iter().map(|(_, r)| r).collect();
    assert_eq!(reasons, ["first", "second", "third"]);
    assert!(queue.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_deliveries_are_dropped_after_one_attempt() {
    let h = Harness::new();
    let engine = h.start().await;
    let queue = engine.queue();
    let mut events = h.bus.subscribe();

    queue.enqueue(CommandAction::Alert, "one").await.unwrap();
    queue.enqueue(CommandAction::Alert, "two").await.unwrap();

    let offline = ScriptedChannel::offline();
    let report = queue.drain(&offline).await.unwrap();

    assert_eq!(offline.attempts(), 2);
    assert_eq!(report.delivered, 0);
    assert_eq!(report.failed.len(), 2);
    assert!(queue.pending().await.unwrap().is_empty());

    assert_eq!(events.recv().await.unwrap().event_type, EVENT_QUEUE_DELIVERY_FAILED);
    assert_eq!(events.recv().await.unwrap().event_type, EVENT_QUEUE_DELIVERY_FAILED);
    let drained = events.recv().await.unwrap();
    assert_eq!(drained.event_type, EVENT_QUEUE_DRAINED);
    assert_eq!(drained.payload["failed"], 2);
}

#[tokio::test]
async fn draining_an_empty_queue_delivers_nothing() {
    let h = Harness::new();
    let engine = h.start().await;

    let report = engine.drain_queue().await.unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(h.channel.attempts(), 0);
}

#[tokio::test]
async fn queue_survives_restart() {
    let h = Harness::new();
    let engine = h.start().await;
    engine.queue().enqueue(CommandAction::Alert, "kept").await.unwrap();
    drop(engine);

    let restarted = h.start().await;
    let pending = restarted.queue().pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].reason, "kept");
}

#[tokio::test]
async fn enqueue_fails_when_storage_is_unavailable() {
    let h = Harness::new();
    let engine = h.start().await;
    h.boot.set_available(false);

    assert!(engine.queue().enqueue(CommandAction::Alert, "lost").await.is_err());
}

#[tokio::test]
async fn one_failed_entry_does_not_stop_the_pass() {
    let h = Harness::new();
    let engine = h.start().await;
    let queue = engine.queue();
    let mut events = h.bus.subscribe();
    h.channel.fail_reason("B");

    for reason in ["A", "B", "C"] {
        queue.enqueue(CommandAction::Alert, reason).await.unwrap();
    }

    let report = engine.drain_queue().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].reason, "B");
    assert_eq!(h.channel.attempts(), 3);

    let reasons: Vec<_> = h.channel.delivered().into_iter().map(|(_, r)| r).collect();
    assert_eq!(reasons, ["A", "C"]);
    assert!(queue.pending().await.unwrap().is_empty());

    let failed = events.recv().await.unwrap();
    assert_eq!(failed.event_type, EVENT_QUEUE_DELIVERY_FAILED);
    assert_eq!(failed.payload["reason"], "B");
}

/// Enqueues `follow_up` while delivering `trigger`, as a detector firing
/// mid-drain would.
struct EnqueuingChannel {
    queue: Arc<OfflineCommandQueue>,
    trigger: &'static str,
    follow_up: &'static str,
    delivered: Mutex<Vec<String>>,
}

#[async_trait]
impl CommandChannel for EnqueuingChannel {
    async fn deliver(&self, _action: CommandAction, reason: &str) -> Result<(), DeliveryError> {
        if reason == self.trigger {
            self.queue
                .enqueue(CommandAction::Alert, self.follow_up)
                .await
                .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        }
        self.delivered.lock().unwrap().push(reason.to_string());
        Ok(())
    }
}

#[tokio::test]
async fn entry_enqueued_during_drain_waits_for_the_next_drain() {
    let h = Harness::new();
    let engine = h.start().await;
    let queue = engine.queue();

    for reason in ["A", "B", "C"] {
        queue.enqueue(CommandAction::Alert, reason).await.unwrap();
    }

    let channel = EnqueuingChannel {
        queue: Arc::clone(queue),
        trigger: "A",
        follow_up: "D",
        delivered: Mutex::new(Vec::new()),
    };

    let report = queue.drain(&channel).await.unwrap();
    assert_eq!(report.attempted, 3);
    assert_eq!(report.delivered, 3);

    let pending: Vec<_> = queue.pending().await.unwrap().into_iter().map(|c| c.reason).collect();
    assert_eq!(pending, ["D"]);

    let report = queue.drain(&channel).await.unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(*channel.delivered.lock().unwrap(), ["A", "B", "C", "D"]);
    assert!(queue.pending().await.unwrap().is_empty());
}
