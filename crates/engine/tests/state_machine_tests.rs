mod common;

use assert_matches::assert_matches;
use custody_core::lock::{LockState, LockType};
use custody_engine::{BootEnforcement, EngineError};
use custody_events::bus::{EVENT_LOCK_HARD, EVENT_LOCK_REENFORCED};
use custody_store::repositories::LockRecordRepo;

use common::{Harness, RestrictionCall, Screen};

fn repo(h: &Harness) -> LockRecordRepo {
    LockRecordRepo::new(h.boot.clone(), h.session.clone())
}

#[tokio::test]
async fn first_start_creates_unlocked_record() {
    let h = Harness::new();
    let engine = h.start().await;

    assert_eq!(engine.boot_enforcement(), BootEnforcement::NotLocked);
    assert_eq!(engine.state_machine().current_state().await.state, LockState::Unlocked);
    let stored = repo(&h).load_boot().await.unwrap().expect("first-run record");
    assert_eq!(stored.state, LockState::Unlocked);
    assert_eq!(h.restrictions.enforce_count(), 0);
}

#[tokio::test]
async fn state_reflects_last_successful_call_in_both_domains() {
    let h = Harness::new();
    let engine = h.start().await;
    let sm = engine.state_machine();

    sm.apply_hard_lock("payment overdue", LockType::Overdue, None).await.unwrap();
    sm.apply_soft_lock("payment due tomorrow").await.unwrap();
    sm.unlock_device().await.unwrap();
    sm.apply_hard_lock("payment overdue", LockType::Overdue, None).await.unwrap();

    let current = sm.current_state().await;
    assert_eq!(current.state, LockState::Hard);
    assert_eq!(current.lock_type, Some(LockType::Overdue));
    assert_eq!(current.reason.as_deref(), Some("payment overdue"));

    let repo = repo(&h);
    assert_eq!(repo.load_boot().await.unwrap(), Some(current.clone()));
    assert_eq!(repo.load_session().await.unwrap(), Some(current));
}

#[tokio::test]
async fn hard_lock_enforces_in_order_and_unlock_releases_in_reverse() {
    let h = Harness::new();
    let engine = h.start().await;
    let sm = engine.state_machine();

    sm.apply_hard_lock("overdue", LockType::Overdue, None).await.unwrap();
    sm.unlock_device().await.unwrap();

    let enforced: Vec<_> = h
        .restrictions
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            RestrictionCall::Enforce(name) => Some(name),
            RestrictionCall::Release(_) => None,
        })
        .collect();
    let mut released: Vec<_> = h
        .restrictions
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            RestrictionCall::Release(name) => Some(name),
            RestrictionCall::Enforce(_) => None,
        })
        .collect();
    released.reverse();

    assert_eq!(enforced.len(), 6);
    assert_eq!(enforced[0], "package_allow_list");
    assert_eq!(enforced, released);
    assert_eq!(h.presentation.last(), Some(Screen::Dismissed));
}

#[tokio::test]
async fn repeated_hard_lock_updates_reason_without_reenforcing() {
    let h = Harness::new();
    let engine = h.start().await;
    let sm = engine.state_machine();

    sm.apply_hard_lock("first", LockType::Overdue, None).await.unwrap();
    sm.apply_hard_lock("second", LockType::Generic, None).await.unwrap();

    assert_eq!(h.restrictions.enforce_count(), 6);
    let current = sm.current_state().await;
    assert_eq!(current.reason.as_deref(), Some("second"));
    assert_eq!(current.lock_type, Some(LockType::Generic));
}

#[tokio::test]
async fn one_failing_restriction_does_not_stop_the_rest() {
    let h = Harness::new();
    h.restrictions.fail_on("single_app_mode");
    let engine = h.start().await;

    engine
        .state_machine()
        .apply_hard_lock("overdue", LockType::Overdue, None)
        .await
        .unwrap();

    assert_eq!(h.restrictions.enforce_count(), 6);
    assert!(engine.state_machine().current_state().await.is_hard());
}

#[tokio::test]
async fn soft_lock_from_hard_releases_restrictions() {
    let h = Harness::new();
    let engine = h.start().await;
    let sm = engine.state_machine();

    sm.apply_hard_lock("overdue", LockType::Overdue, None).await.unwrap();
    sm.apply_soft_lock("reminder").await.unwrap();

    assert_eq!(h.restrictions.release_count(), 6);
    assert_eq!(h.presentation.last(), Some(Screen::Warning("reminder".into())));
    let current = sm.current_state().await;
    assert_eq!(current.state, LockState::Soft);
    assert_eq!(current.lock_type, Some(LockType::Reminder));
}

#[tokio::test]
async fn unlock_from_unlocked_still_releases_everything() {
    let h = Harness::new();
    let engine = h.start().await;

    engine.state_machine().unlock_device().await.unwrap();

    assert_eq!(h.restrictions.release_count(), 6);
    assert_eq!(h.presentation.last(), Some(Screen::Dismissed));
}

#[tokio::test]
async fn deactivation_is_hard_without_restrictions() {
    let h = Harness::new();
    let engine = h.start().await;

    engine
        .state_machine()
        .apply_hard_lock("contract closed", LockType::Deactivation, None)
        .await
        .unwrap();

    assert_eq!(h.restrictions.enforce_count(), 0);
    assert_eq!(
        h.presentation.last(),
        Some(Screen::Lock("contract closed".into(), LockType::Deactivation))
    );

    let restarted = h.start().await;
    assert_eq!(restarted.boot_enforcement(), BootEnforcement::Deactivated);
    assert_eq!(h.restrictions.enforce_count(), 0);
}

#[tokio::test]
async fn boot_check_reenforces_exactly_once() {
    let h = Harness::new();
    let engine = h.start().await;
    engine
        .state_machine()
        .apply_hard_lock("overdue", LockType::Overdue, None)
        .await
        .unwrap();
    drop(engine);
    h.restrictions.reset();

    let mut events = h.bus.subscribe();
    let restarted = h.start().await;
    assert_eq!(restarted.boot_enforcement(), BootEnforcement::Reenforced);
    assert_eq!(h.restrictions.enforce_count(), 6);
    assert_eq!(events.recv().await.unwrap().event_type, EVENT_LOCK_REENFORCED);

    let again = restarted.state_machine().check_and_enforce_on_boot().await.unwrap();
    assert_eq!(again, BootEnforcement::AlreadyEnforced);
    assert_eq!(h.restrictions.enforce_count(), 6);
    assert_eq!(
        h.presentation.last(),
        Some(Screen::Lock("overdue".into(), LockType::Overdue))
    );
}

#[tokio::test]
async fn boot_check_reads_only_the_boot_store() {
    let h = Harness::new();
    let engine = h.start().await;
    engine
        .state_machine()
        .apply_hard_lock("overdue", LockType::Overdue, None)
        .await
        .unwrap();
    drop(engine);

    // Before first unlock after a reboot the session domain is unreadable.
    h.session.set_available(false);
    h.restrictions.reset();

    let restarted = h.start().await;
    assert_eq!(restarted.boot_enforcement(), BootEnforcement::Reenforced);
    assert_eq!(h.restrictions.enforce_count(), 6);
}

#[tokio::test]
async fn boot_store_failure_aborts_the_transition() {
    let h = Harness::new();
    let engine = h.start().await;
    h.boot.set_available(false);

    let err = engine
        .state_machine()
        .apply_hard_lock("overdue", LockType::Overdue, None)
        .await
        .unwrap_err();

    assert_matches!(err, EngineError::BootPersist(_));
    assert!(!err.transition_applied());
    assert_eq!(engine.state_machine().current_state().await.state, LockState::Unlocked);
    assert_eq!(h.restrictions.enforce_count(), 0);
}

#[tokio::test]
async fn session_failure_applies_transition_and_reconciles_later() {
    let h = Harness::new();
    let engine = h.start().await;
    let sm = engine.state_machine();
    let mut events = h.bus.subscribe();
    h.session.set_available(false);

    let err = sm
        .apply_hard_lock("overdue", LockType::Overdue, None)
        .await
        .unwrap_err();
    assert_matches!(err, EngineError::SessionPersist(_));
    assert!(err.transition_applied());
    assert!(sm.current_state().await.is_hard());
    assert_eq!(h.restrictions.enforce_count(), 6);
    assert_eq!(events.recv().await.unwrap().event_type, EVENT_LOCK_HARD);

    h.session.set_available(true);
    let repo = repo(&h);
    assert_eq!(repo.load_session().await.unwrap().unwrap().state, LockState::Unlocked);

    sm.apply_soft_lock("reminder").await.unwrap();
    assert_eq!(repo.load_session().await.unwrap().unwrap().state, LockState::Soft);
}
