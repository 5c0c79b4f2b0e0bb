//! Priority ordering for the live queue display.
//!
//! Deterministic, pure logic. No IO, no wall-clock, no randomness.
//!
//! # Design
//!
//! Every customer maps to a [`SortKey`]; the displayed order is the ascending
//! sort of those keys. The key is built so the comparison is a **strict total
//! order** over distinct customers: two different rows never compare equal,
//! so repeated renders and concurrent display clients always agree.
//!
//! Key layout, most significant first:
//!
//! 1. Status class: `serving` rows sort before everything else. A customer
//!    already at a counter must not be displaced in secondary listings.
//! 2. Override lane: rows with a `manual_position` sort before all
//!    algorithmically ordered rows within the same status class.
//! 3. Primary rank: the manual position itself, or
//!    `-priority_weight * 100_000 + created_at_epoch` for algorithmic rows
//!    (heavier weight and earlier arrival both rank earlier).
//! 4. `created_at` epoch seconds.
//! 5. Ascending numeric id, the final tie-break; guarantees strictness.
//!
//! Priority flags are checked in a fixed precedence order: senior citizen,
//! then PWD, then pregnant. A customer with several flags set is scored by
//! the highest-precedence flag only. That is a deliberate product policy;
//! do not change it without a product decision.

use qdk_schemas::{Customer, QueueStatus};
use std::cmp::Ordering;

pub const WEIGHT_SENIOR: i64 = 1000;
pub const WEIGHT_PWD: i64 = 900;
pub const WEIGHT_PREGNANT: i64 = 800;

/// Spacing between weight tiers in the algorithmic rank. Large enough that a
/// weight step dominates any realistic same-day arrival-time difference.
const WEIGHT_SPREAD: i64 = 100_000;

// ---------------------------------------------------------------------------
// Weight + key
// ---------------------------------------------------------------------------

/// Numeric priority score for a customer. Flags are checked in precedence
/// order (senior > pwd > pregnant); the first match wins, combinations do
/// not stack.
pub fn priority_weight(c: &Customer) -> i64 {
    if c.senior_citizen {
        WEIGHT_SENIOR
    } else if c.pwd {
        WEIGHT_PWD
    } else if c.pregnant {
        WEIGHT_PREGNANT
    } else {
        0
    }
}

/// Total-order sort key. Ascending sort of these keys is the display order.
pub type SortKey = (u8, u8, i64, i64, i64);

pub fn sort_key(c: &Customer) -> SortKey {
    let class = match c.status {
        QueueStatus::Serving => 0,
        _ => 1,
    };
    let created = c.created_at.timestamp();
    match c.manual_position {
        Some(pos) => (class, 0, i64::from(pos), created, c.id),
        None => {
            let rank = -priority_weight(c) * WEIGHT_SPREAD + created;
            (class, 1, rank, created, c.id)
        }
    }
}

/// Comparator over two customers. Never returns `Equal` for rows with
/// distinct ids.
pub fn compare(a: &Customer, b: &Customer) -> Ordering {
    sort_key(a).cmp(&sort_key(b))
}

// ---------------------------------------------------------------------------
// Queue ordering
// ---------------------------------------------------------------------------

/// Order a batch of live customers for display/service.
///
/// Pure function: consumes the input, returns it sorted, never rejects or
/// drops a row. Statuses other than `serving` (including `processing`, should
/// a caller pass one) all order within the second status class by the normal
/// key.
pub fn order_queue(mut customers: Vec<Customer>) -> Vec<Customer> {
    customers.sort_by(compare);
    customers
}

/// In-place variant for callers that already own a mutable slice.
pub fn order_in_place(customers: &mut [Customer]) {
    customers.sort_by(compare);
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn customer(id: i64, status: QueueStatus, created_secs: i64) -> Customer {
        Customer {
            id,
            name: format!("c{id}"),
            token_number: id as i32,
            status,
            senior_citizen: false,
            pregnant: false,
            pwd: false,
            manual_position: None,
            carried_forward: false,
            created_at: Utc.timestamp_opt(created_secs, 0).unwrap(),
            served_at: None,
        }
    }

    fn ids(v: &[Customer]) -> Vec<i64> {
        v.iter().map(|c| c.id).collect()
    }

    // Scenario from the product team: A (pwd, created T0), B (no flags,
    // created T1 < T0), C (manual_position = 1). Expected order: C, A, B.
    #[test]
    fn manual_override_then_priority_then_fifo() {
        let t1 = 1_760_000_000; // B arrives first
        let t0 = t1 + 600; // A arrives later but holds a PWD flag
        let a = Customer { pwd: true, ..customer(1, QueueStatus::Waiting, t0) };
        let b = customer(2, QueueStatus::Waiting, t1);
        let c = Customer {
            manual_position: Some(1),
            ..customer(3, QueueStatus::Waiting, t1 + 1200)
        };

        let ordered = order_queue(vec![a, b, c]);
        assert_eq!(ids(&ordered), vec![3, 1, 2]);
    }

    #[test]
    fn senior_sorts_before_earlier_regular() {
        let regular = customer(1, QueueStatus::Waiting, 1_760_000_000);
        let senior = Customer {
            senior_citizen: true,
            ..customer(2, QueueStatus::Waiting, 1_760_000_000 + 3600)
        };
        assert_eq!(compare(&senior, &regular), Ordering::Less);
    }

    #[test]
    fn manual_position_beats_senior_flag() {
        let senior = Customer {
            senior_citizen: true,
            ..customer(1, QueueStatus::Waiting, 1_760_000_000)
        };
        let manual = Customer {
            manual_position: Some(5),
            ..customer(2, QueueStatus::Waiting, 1_760_000_000 + 7200)
        };
        assert_eq!(compare(&manual, &senior), Ordering::Less);
    }

    #[test]
    fn serving_class_sorts_before_waiting_regardless_of_flags() {
        let serving = customer(1, QueueStatus::Serving, 1_760_000_000 + 9999);
        let waiting_senior = Customer {
            senior_citizen: true,
            manual_position: Some(1),
            ..customer(2, QueueStatus::Waiting, 1_760_000_000)
        };
        assert_eq!(compare(&serving, &waiting_senior), Ordering::Less);
    }

    // Product policy: flags do not stack; precedence is senior > pwd > pregnant.
    #[test]
    fn senior_and_pregnant_scores_as_senior() {
        let both = Customer {
            senior_citizen: true,
            pregnant: true,
            ..customer(1, QueueStatus::Waiting, 0)
        };
        assert_eq!(priority_weight(&both), WEIGHT_SENIOR);

        let pwd_and_pregnant = Customer {
            pwd: true,
            pregnant: true,
            ..customer(2, QueueStatus::Waiting, 0)
        };
        assert_eq!(priority_weight(&pwd_and_pregnant), WEIGHT_PWD);
    }

    #[test]
    fn weight_precedence_order() {
        let mk = |senior, pwd, pregnant| Customer {
            senior_citizen: senior,
            pwd,
            pregnant,
            ..customer(1, QueueStatus::Waiting, 0)
        };
        assert_eq!(priority_weight(&mk(false, false, false)), 0);
        assert_eq!(priority_weight(&mk(false, false, true)), WEIGHT_PREGNANT);
        assert_eq!(priority_weight(&mk(false, true, false)), WEIGHT_PWD);
        assert_eq!(priority_weight(&mk(true, false, false)), WEIGHT_SENIOR);
    }

    #[test]
    fn fifo_within_same_weight_tier() {
        let early = Customer { pwd: true, ..customer(1, QueueStatus::Waiting, 1000) };
        let late = Customer { pwd: true, ..customer(2, QueueStatus::Waiting, 2000) };
        assert_eq!(compare(&early, &late), Ordering::Less);
    }

    // A pwd row created exactly WEIGHT_SPREAD * (senior - pwd) seconds before
    // a senior row collides on the primary rank; created_at breaks the tie.
    #[test]
    fn rank_collision_across_tiers_breaks_on_created_at() {
        let gap = (WEIGHT_SENIOR - WEIGHT_PWD) * WEIGHT_SPREAD;
        let pwd = Customer { pwd: true, ..customer(1, QueueStatus::Waiting, 0) };
        let senior = Customer {
            senior_citizen: true,
            ..customer(2, QueueStatus::Waiting, gap)
        };
        assert_eq!(sort_key(&pwd).2, sort_key(&senior).2, "ranks must collide");
        assert_eq!(compare(&pwd, &senior), Ordering::Less);
    }

    #[test]
    fn identical_attributes_break_on_ascending_id() {
        let a = customer(7, QueueStatus::Waiting, 1_760_000_000);
        let b = customer(3, QueueStatus::Waiting, 1_760_000_000);
        assert_eq!(compare(&b, &a), Ordering::Less);

        let same_manual_a = Customer { manual_position: Some(2), ..a };
        let same_manual_b = Customer { manual_position: Some(2), ..b };
        assert_eq!(compare(&same_manual_b, &same_manual_a), Ordering::Less);
    }

    #[test]
    fn ordering_is_deterministic_across_calls() {
        let mut pool = Vec::new();
        for i in 0..12 {
            let mut c = customer(i, QueueStatus::Waiting, 1_760_000_000 + (i % 4) * 60);
            c.senior_citizen = i % 3 == 0;
            c.pwd = i % 4 == 1;
            c.manual_position = if i % 5 == 2 { Some((i % 3) as i32) } else { None };
            if i % 2 == 0 {
                c.status = QueueStatus::Serving;
            }
            pool.push(c);
        }
        let first = ids(&order_queue(pool.clone()));
        let mut reversed = pool.clone();
        reversed.reverse();
        let second = ids(&order_queue(reversed));
        assert_eq!(first, second, "input order must not leak into the result");
        assert_eq!(first, ids(&order_queue(pool)));
    }

    // Antisymmetry + totality: for every pair of distinct rows exactly one of
    // `a before b` / `b before a` holds.
    #[test]
    fn comparator_is_a_strict_total_order() {
        let mut pool = Vec::new();
        for i in 0..16 {
            let mut c = customer(i, QueueStatus::Waiting, 1_760_000_000 + (i % 5) * 30);
            c.senior_citizen = i % 2 == 0;
            c.pregnant = i % 3 == 0;
            c.pwd = i % 7 == 0;
            c.manual_position = if i % 4 == 0 { Some((i % 2) as i32) } else { None };
            if i % 6 == 0 {
                c.status = QueueStatus::Serving;
            }
            pool.push(c);
        }
        for a in &pool {
            for b in &pool {
                if a.id == b.id {
                    assert_eq!(compare(a, b), Ordering::Equal);
                    continue;
                }
                let ab = compare(a, b);
                let ba = compare(b, a);
                assert_ne!(ab, Ordering::Equal, "distinct rows must never tie");
                assert_eq!(ab, ba.reverse(), "comparator must be antisymmetric");
            }
        }
    }

    #[test]
    fn processing_rows_order_within_the_second_class() {
        let processing = customer(1, QueueStatus::Processing, 1_760_000_000);
        let waiting = customer(2, QueueStatus::Waiting, 1_760_000_000 + 60);
        let serving = customer(3, QueueStatus::Serving, 1_760_000_000 + 120);
        let ordered = order_queue(vec![waiting.clone(), processing.clone(), serving.clone()]);
        assert_eq!(ids(&ordered), vec![3, 1, 2], "serving first, then FIFO");
    }
}
