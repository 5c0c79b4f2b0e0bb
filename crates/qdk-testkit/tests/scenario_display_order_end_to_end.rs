//! Scenario: display ordering over a queue that survived a reset.
//!
//! # Invariants under test
//!
//! 1. Serving customers head the list, ahead of every waiting row.
//! 2. Manual positions come next, in position order, before all
//!    algorithmically ranked rows.
//! 3. Priority tiers rank senior > PWD > pregnant > none; flags do not
//!    stack, and within a tier earlier arrival wins.
//! 4. A customer carried across the nightly reset keeps their `created_at`
//!    and therefore their fairness standing against newer arrivals.

use chrono::{DateTime, TimeZone, Utc};
use qdk_reset::store::ResetStore;
use qdk_reset::{CycleResult, ResetScheduler, SchedulerConfig};
use qdk_schemas::QueueStatus;
use qdk_testkit::{CustomerSeed, MemoryActivityLog, MemoryStore};
use std::sync::Arc;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_760_000_000 + secs, 0).unwrap()
}

#[tokio::test]
async fn carried_forward_queue_orders_deterministically() {
    let store = MemoryStore::new();

    // Yesterday: one plain customer never got served, one finished.
    let carried = store.seed(CustomerSeed::named("Avelina Reyes").created_at(at(0)));
    let finished = store.seed(CustomerSeed::named("Basilio Cruz").created_at(at(10)));
    store.set_status(finished, QueueStatus::Completed);

    let sched = Arc::new(ResetScheduler::new(
        store.clone(),
        MemoryActivityLog::new(),
        SchedulerConfig::default(),
    ));
    let result = sched.run_scheduled_cycle().await;
    assert!(matches!(result, CycleResult::Completed(_)));

    // Today's arrivals, all later than the carried row.
    let serving = store.seed(
        CustomerSeed::named("Carmen Dizon")
            .status(QueueStatus::Serving)
            .created_at(at(100)),
    );
    let plain_new = store.seed(CustomerSeed::named("Diego Santos").created_at(at(101)));
    let pregnant = store.seed(
        CustomerSeed::named("Elena Bautista")
            .pregnant()
            .created_at(at(102)),
    );
    let pwd = store.seed(CustomerSeed::named("Flora Mendoza").pwd().created_at(at(105)));
    let senior = store.seed(
        CustomerSeed::named("Gregorio Lim")
            .senior()
            .created_at(at(110)),
    );
    let pinned_second = store.seed(
        CustomerSeed::named("Hilaria Ocampo")
            .pregnant()
            .manual_position(2)
            .created_at(at(90)),
    );
    let pinned_first = store.seed(
        CustomerSeed::named("Isko Valdez")
            .manual_position(1)
            .created_at(at(120)),
    );

    let live = store.fetch_live_queue().await.unwrap();
    assert_eq!(live.len(), 8, "carried row plus seven of today's");

    let ordered = qdk_ordering::order_queue(live);
    let ids: Vec<i64> = ordered.iter().map(|c| c.id).collect();
    assert_eq!(
        ids,
        vec![
            serving,       // at the counter, always first
            pinned_first,  // manual positions, in position order
            pinned_second, // pinned wins over its own pregnant flag
            senior,        // highest tier despite latest arrival
            pwd,
            pregnant,
            carried,       // plain tier: yesterday's created_at wins
            plain_new,
        ]
    );

    // The carried row really is the reset survivor, standing on its old clock.
    let survivor = ordered.iter().find(|c| c.id == carried).unwrap();
    assert!(survivor.carried_forward);
    assert_eq!(survivor.created_at, at(0));

    // Determinism: re-ordering an identical fetch gives the identical list.
    let again = qdk_ordering::order_queue(store.fetch_live_queue().await.unwrap());
    let ids_again: Vec<i64> = again.iter().map(|c| c.id).collect();
    assert_eq!(ids, ids_again);
}
