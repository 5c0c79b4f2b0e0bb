//! Shared data types for the QueueDesk daily-reset subsystem.
//!
//! Plain serde structs only: no IO, no business logic beyond small
//! classification helpers on [`QueueStatus`]. Every other crate in the
//! workspace depends on this one.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// QueueStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a live queue customer.
///
/// `Completed` and `Cancelled` are terminal: the nightly rollover archives
/// those rows into `customer_history`. Everything else is carried forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Registered, not yet called to a counter.
    Waiting,
    /// Called to a counter; service in progress.
    Serving,
    /// Service done at the counter, back-office work (payment, paperwork) pending.
    Processing,
    /// Fully served. **Terminal.**
    Completed,
    /// Left the queue or was removed by an operator. **Terminal.**
    Cancelled,
}

impl QueueStatus {
    /// Terminal statuses are archived by the daily reset; the rest survive it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Serving => "serving",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "serving" => Ok(Self::Serving),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("invalid queue status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Customer (live queue row)
// ---------------------------------------------------------------------------

/// A live queue customer as stored in the `customers` table.
///
/// `created_at` is the natural FIFO tie-break and must survive a daily reset
/// unchanged for carried-forward rows. `manual_position` is an operator
/// override; lower values serve earlier, ahead of all algorithmic ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    /// Sequential per-day ticket number; counter resets to 1 each night.
    pub token_number: i32,
    pub status: QueueStatus,
    pub senior_citizen: bool,
    pub pregnant: bool,
    pub pwd: bool,
    pub manual_position: Option<i32>,
    /// Set by the rollover when the row survived at least one daily reset.
    pub carried_forward: bool,
    pub created_at: DateTime<Utc>,
    /// Set by the counter-assignment path when service starts; feeds the
    /// average-wait aggregate in the daily snapshot.
    pub served_at: Option<DateTime<Utc>>,
}

impl Customer {
    /// True if any priority-lane flag is set.
    pub fn is_priority(&self) -> bool {
        self.senior_citizen || self.pwd || self.pregnant
    }
}

// ---------------------------------------------------------------------------
// Reset ledger
// ---------------------------------------------------------------------------

/// One attempt of the daily reset, successful or not. Append-only.
///
/// At most one entry per `reset_date` may carry `success = true`; the store
/// enforces this with a partial unique index, which is the cross-process
/// at-most-once guarantee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetLogEntry {
    pub id: i64,
    pub reset_date: NaiveDate,
    pub success: bool,
    pub error_detail: Option<String>,
    pub duration_ms: i64,
    pub archived: i64,
    pub carried_forward: i64,
    pub processed: i64,
    pub created_at: DateTime<Utc>,
}

/// Ledger entry about to be recorded (no id / created_at yet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewResetLogEntry {
    pub reset_date: NaiveDate,
    pub success: bool,
    pub error_detail: Option<String>,
    pub duration_ms: i64,
    pub archived: i64,
    pub carried_forward: i64,
    pub processed: i64,
}

impl NewResetLogEntry {
    pub fn success(outcome: &ResetOutcome) -> Self {
        Self {
            reset_date: outcome.reset_date,
            success: true,
            error_detail: None,
            duration_ms: outcome.duration_ms,
            archived: outcome.archived,
            carried_forward: outcome.carried_forward,
            processed: outcome.processed,
        }
    }

    pub fn failure(day: NaiveDate, error: impl Into<String>, duration_ms: i64) -> Self {
        Self {
            reset_date: day,
            success: false,
            error_detail: Some(error.into()),
            duration_ms,
            archived: 0,
            carried_forward: 0,
            processed: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// History rows
// ---------------------------------------------------------------------------

/// One row per historical day with the aggregate shape of that day's queue.
/// Written exactly once by the rollover, immutable afterwards, purged after
/// the retention window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyHistorySnapshot {
    pub snapshot_date: NaiveDate,
    pub total_customers: i64,
    pub waiting: i64,
    pub serving: i64,
    pub completed: i64,
    pub cancelled: i64,
    pub priority_customers: i64,
    pub avg_wait_secs: i64,
    pub peak_queue_length: i32,
    pub created_at: DateTime<Utc>,
}

/// Frozen copy of a customer at archive time.
///
/// Keyed `(original_customer_id, archive_date)`: a customer can appear in
/// history at most once per archived day. Carried-forward customers get no
/// history row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerHistoryRecord {
    pub original_customer_id: i64,
    pub archive_date: NaiveDate,
    pub token_number: i32,
    pub name: String,
    pub status: QueueStatus,
    pub senior_citizen: bool,
    pub pregnant: bool,
    pub pwd: bool,
    pub created_at: DateTime<Utc>,
    pub served_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Rollover / purge / outcome
// ---------------------------------------------------------------------------

/// Row counts produced by one transactional rollover.
/// `processed = archived + carried_forward` (every live row is one or the other).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverCounts {
    pub archived: i64,
    pub carried_forward: i64,
    pub processed: i64,
}

/// Rows deleted by one retention-cleanup pass, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeCounts {
    pub snapshots: i64,
    pub customer_records: i64,
    pub reset_log: i64,
}

impl PurgeCounts {
    pub fn total(&self) -> i64 {
        self.snapshots + self.customer_records + self.reset_log
    }
}

/// Result of one reset cycle as reported by the scheduler.
///
/// `no_op = true` means the idempotency short-circuit fired: a successful
/// ledger entry for `reset_date` already existed and nothing was touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetOutcome {
    pub reset_date: NaiveDate,
    pub archived: i64,
    pub carried_forward: i64,
    pub processed: i64,
    pub duration_ms: i64,
    pub no_op: bool,
}

impl ResetOutcome {
    /// Outcome for a cycle short-circuited by the ledger.
    pub fn no_op(day: NaiveDate) -> Self {
        Self {
            reset_date: day,
            archived: 0,
            carried_forward: 0,
            processed: 0,
            duration_ms: 0,
            no_op: true,
        }
    }

    pub fn from_counts(day: NaiveDate, counts: &RolloverCounts, duration_ms: i64) -> Self {
        Self {
            reset_date: day,
            archived: counts.archived,
            carried_forward: counts.carried_forward,
            processed: counts.processed,
            duration_ms,
            no_op: false,
        }
    }
}

/// Broadcast payload emitted when a reset cycle produced an outcome.
/// Display clients only need the counts; the transport wrapping is the
/// daemon's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetEvent {
    pub outcome: ResetOutcome,
    /// "scheduled" | "manual" | "recovery"
    pub trigger: String,
    pub ts_utc: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
