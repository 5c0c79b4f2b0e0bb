//! Storage boundary for the daily reset engine.
//!
//! This module defines **only** the store trait and its error type. No SQL,
//! no pooling, no in-memory state lives here. The Postgres implementation is
//! `qdk-db`; the in-memory double used by scenario tests is `qdk-testkit`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use qdk_schemas::{Customer, NewResetLogEntry, PurgeCounts, RolloverCounts};
use std::fmt;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that a [`ResetStore`] implementation may return.
#[derive(Debug)]
pub enum StoreError {
    /// A successful reset for the same queue day is already on record.
    ///
    /// Raised by [`ResetStore::record_reset`] when the per-day success
    /// uniqueness rule rejects the write, which means another instance (or an
    /// earlier cycle) completed the day first.
    DuplicateSuccess,
    /// The backing store could not be reached or a statement timed out.
    Unavailable(String),
    /// A row violated an integrity rule or could not be decoded.
    Data(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::DuplicateSuccess => {
                write!(f, "a successful reset is already recorded for this day")
            }
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            StoreError::Data(msg) => write!(f, "store data error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Persistence contract consumed by the scheduler, executor and cleanup.
///
/// Implementations must be object-safe so callers can hold an
/// `Arc<dyn ResetStore>` without knowing the concrete type, and `Send + Sync`
/// so the scheduler can fan work out across tokio tasks.
#[async_trait]
pub trait ResetStore: Send + Sync {
    /// Whether the reset ledger already holds a successful entry for `day`.
    ///
    /// Failed entries for the same day do not count; only a recorded success
    /// makes a day final.
    async fn reset_succeeded_on(&self, day: NaiveDate) -> Result<bool, StoreError>;

    /// Append one attempt (success or failure) to the reset ledger.
    ///
    /// Returns [`StoreError::DuplicateSuccess`] when `entry.success` is true
    /// and a success row for `entry.reset_date` already exists. Failure
    /// entries are never rejected for duplication; every attempt is kept.
    async fn record_reset(&self, entry: &NewResetLogEntry) -> Result<(), StoreError>;

    /// Perform the day rollover for `day` as one atomic unit.
    ///
    /// Either all of the following happen or none of them do: the daily
    /// history snapshot is written, terminal customers are archived and
    /// removed from the live queue, non-terminal customers are flagged as
    /// carried forward, and the token counter returns to its starting value.
    /// `now` is the instant the cycle started; implementations use it for
    /// archive timestamps rather than reading the wall clock again.
    async fn rollover_day(
        &self,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<RolloverCounts, StoreError>;

    /// Delete history snapshots, archived customer records and reset ledger
    /// rows dated strictly before `cutoff`.
    async fn purge_history_before(&self, cutoff: NaiveDate) -> Result<PurgeCounts, StoreError>;

    /// All live customers eligible for display ordering, i.e. those with
    /// `waiting` or `serving` status. Row order is unspecified; callers sort.
    async fn fetch_live_queue(&self) -> Result<Vec<Customer>, StoreError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
