//! Scenario: a failed scheduled reset gets exactly one recovery attempt.
//!
//! # Invariants under test
//!
//! 1. A failed scheduled cycle arms one delayed recovery attempt.
//! 2. A failed recovery attempt does NOT re-arm: unattended attempts are
//!    bounded at two per day, and the cycle rests in `Failed` waiting for an
//!    operator.
//! 3. A recovery attempt after a transient outage completes the day normally.

use qdk_reset::{activity, CycleResult, CyclePhase, ResetScheduler, SchedulerConfig};
use qdk_schemas::QueueStatus;
use qdk_testkit::{CustomerSeed, MemoryActivityLog, MemoryStore};
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        recovery_delay: Duration::ZERO,
        ..SchedulerConfig::default()
    }
}

/// Yield until `done` holds or the budget runs out. The recovery task runs on
/// the same current-thread runtime, so yielding drives it.
async fn settle(mut done: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition did not settle");
}

#[tokio::test]
async fn persistent_outage_stops_after_one_recovery_attempt() {
    let store = MemoryStore::new();
    let log = MemoryActivityLog::new();
    store.fail_all_rollovers();

    let sched = Arc::new(ResetScheduler::new(store.clone(), log.clone(), fast_config()));

    let result = sched.run_scheduled_cycle().await;
    assert!(matches!(result, CycleResult::Failed(_)));

    settle(|| log.count(activity::ACTION_RECOVERY_FAILED) == 1).await;
    // Give a (buggy) second recovery every chance to fire, then count.
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }

    assert_eq!(store.rollover_calls(), 2, "scheduled attempt + one recovery");
    assert_eq!(log.count(activity::ACTION_RECOVERY_SCHEDULED), 1);
    assert_eq!(sched.status().phase, CyclePhase::Failed);
    assert!(!sched.status().recovery_pending, "recovery must not re-arm");

    // Every attempt left an honest failure entry.
    let ledger = store.ledger();
    assert_eq!(ledger.len(), 2);
    assert!(ledger.iter().all(|e| !e.success));
    assert!(ledger.iter().all(|e| e.error_detail.is_some()));
}

#[tokio::test]
async fn recovery_completes_the_day_after_transient_outage() {
    let store = MemoryStore::new();
    let log = MemoryActivityLog::new();
    store.seed(CustomerSeed::named("Avelina Reyes").status(QueueStatus::Completed));
    store.seed(CustomerSeed::named("Basilio Cruz"));
    store.fail_next_rollovers(1);

    let sched = Arc::new(ResetScheduler::new(store.clone(), log.clone(), fast_config()));

    let result = sched.run_scheduled_cycle().await;
    assert!(matches!(result, CycleResult::Failed(_)));
    assert_eq!(sched.status().phase, CyclePhase::RecoveryPending);

    settle(|| log.count(activity::ACTION_RECOVERY_SUCCESS) == 1).await;
    assert_eq!(sched.status().phase, CyclePhase::Succeeded);
    assert_eq!(store.rollover_calls(), 2);

    // The day finished: terminal row archived, survivor carried, success on
    // record after the failure entry.
    assert_eq!(store.archived().len(), 1);
    assert_eq!(store.customers().len(), 1);
    assert!(store.customers()[0].carried_forward);
    let ledger = store.ledger();
    assert_eq!(ledger.len(), 2);
    assert!(!ledger[0].success);
    assert!(ledger[1].success);
}
