//! Queue-day boundary math.
//!
//! Deterministic, pure logic. No IO, no wall-clock reads; callers pass `now`.
//!
//! # Design
//!
//! The queue day is defined by the configured shop timezone, not by UTC. A
//! reset cycle that starts at 2026-08-22 00:00 Asia/Manila closes the queue
//! day 2026-08-22 even though UTC is still on the 21st. Both functions here
//! take the instant and the zone explicitly so every caller (scheduler timer,
//! manual trigger, cleanup ticker, tests) resolves the day the same way.
//!
//! Zone transitions are handled per the tz database:
//! - a skipped local midnight (spring-forward gap) resolves to the first
//!   local instant that exists on that date;
//! - an ambiguous local midnight (fall-back overlap) resolves to the earlier
//!   of the two instants, so the reset never waits an extra repeated hour.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// The queue day that `now` falls in, in the shop timezone.
pub fn local_day(now: DateTime<Utc>, tz: Tz) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// UTC instant of the next local-midnight boundary strictly after `now`.
///
/// This is the instant the scheduler timer sleeps until. When the boundary
/// itself does not exist or exists twice in local time, the gap/overlap rules
/// from the module docs apply.
pub fn next_local_midnight(now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let mut day = local_day(now, tz);
    // Tomorrow's first instant is the normal answer; scan a couple of days
    // further in case a pathological zone leaves no usable instant.
    for _ in 0..3 {
        day = match day.succ_opt() {
            Some(d) => d,
            None => return now + Duration::days(1),
        };
        if let Some(at) = first_instant_of_day(day, tz) {
            if at > now {
                return at;
            }
        }
    }
    now + Duration::days(1)
}

/// First UTC instant belonging to local `day` in `tz`.
///
/// Starts at 00:00 and walks forward hour by hour while the local time falls
/// in a transition gap. Ambiguous times take the earlier instant.
fn first_instant_of_day(day: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    for hour in 0..24u32 {
        let Some(time) = NaiveTime::from_hms_opt(hour, 0, 0) else {
            return None;
        };
        match tz.from_local_datetime(&day.and_time(time)) {
            LocalResult::Single(at) => return Some(at.with_timezone(&Utc)),
            LocalResult::Ambiguous(earlier, _later) => {
                return Some(earlier.with_timezone(&Utc))
            }
            LocalResult::None => continue,
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
