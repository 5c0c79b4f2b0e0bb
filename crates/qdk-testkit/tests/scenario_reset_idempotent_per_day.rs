//! Scenario: one reset per queue day.
//!
//! # Invariants under test
//!
//! 1. The first trigger of a day runs the rollover and records one success.
//! 2. Every later trigger the same day (manual or scheduled) is a no-op:
//!    the rollover does not run again and no second ledger entry appears.
//! 3. The no-op is announced on the audit trail and the event bus, so
//!    operators and display clients see that the trigger was handled.

use qdk_reset::{activity, CycleResult, ResetScheduler, SchedulerConfig};
use qdk_schemas::QueueStatus;
use qdk_testkit::{CustomerSeed, MemoryActivityLog, MemoryStore};
use std::sync::Arc;

#[tokio::test]
async fn second_trigger_same_day_is_a_noop() {
    let store = MemoryStore::new();
    let log = MemoryActivityLog::new();
    store.seed(CustomerSeed::named("Avelina Reyes").status(QueueStatus::Completed));
    store.seed(CustomerSeed::named("Basilio Cruz"));

    let sched = Arc::new(ResetScheduler::new(
        store.clone(),
        log.clone(),
        SchedulerConfig::default(),
    ));
    let mut events = sched.subscribe();

    // First trigger does the real work.
    let first = sched.trigger_manual_reset().await.unwrap();
    assert!(!first.no_op);
    assert_eq!(first.archived, 1);
    assert_eq!(first.carried_forward, 1);
    assert_eq!(first.processed, 2);

    // Second manual trigger short-circuits.
    let second = sched.trigger_manual_reset().await.unwrap();
    assert!(second.no_op, "same-day re-trigger must be a no-op");
    assert_eq!(second.processed, 0);

    // A timer boundary firing after the manual run is equally inert.
    let scheduled = sched.run_scheduled_cycle().await;
    match scheduled {
        CycleResult::Completed(outcome) => assert!(outcome.no_op),
        other => panic!("expected completed no-op, got {other:?}"),
    }

    assert_eq!(store.rollover_calls(), 1, "rollover must run exactly once");
    let ledger = store.ledger();
    assert_eq!(ledger.len(), 1, "exactly one ledger entry for the day");
    assert!(ledger[0].success);

    // Data moved once and stayed moved.
    assert_eq!(store.archived().len(), 1);
    assert_eq!(store.customers().len(), 1);
    assert!(store.customers()[0].carried_forward);

    assert_eq!(log.count(activity::ACTION_RESET_COMPLETED), 1);
    assert_eq!(log.count(activity::ACTION_RESET_NOOP), 2);

    // All three cycles broadcast an outcome; the later two flagged no-op.
    let e1 = events.try_recv().unwrap();
    let e2 = events.try_recv().unwrap();
    let e3 = events.try_recv().unwrap();
    assert!(!e1.outcome.no_op);
    assert!(e2.outcome.no_op);
    assert!(e3.outcome.no_op);
    assert_eq!(e1.trigger, "manual");
    assert_eq!(e3.trigger, "scheduled");
}
