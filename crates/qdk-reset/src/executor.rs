//! Daily reset executor.
//!
//! One attempt of the transactional day rollover, bounded by a deadline. The
//! executor performs no retries and never consults the reset ledger; both the
//! idempotency short-circuit and the recovery policy live in the scheduler.
//! When the deadline fires the store transaction is dropped mid-flight and
//! rolls back on its own, so a timed-out attempt leaves no partial state.

use crate::store::{ResetStore, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use qdk_schemas::ResetOutcome;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Why one rollover attempt produced no outcome.
#[derive(Debug)]
pub enum ResetError {
    /// The attempt outlived its deadline and was abandoned.
    TimedOut { limit_secs: u64 },
    /// The store refused or failed the rollover.
    Store(StoreError),
}

impl fmt::Display for ResetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetError::TimedOut { limit_secs } => {
                write!(f, "rollover exceeded the {limit_secs}s deadline")
            }
            ResetError::Store(e) => write!(f, "rollover store error: {e}"),
        }
    }
}

impl std::error::Error for ResetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResetError::TimedOut { .. } => None,
            ResetError::Store(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Runs one day rollover against the store with a hard time limit.
pub struct DailyResetExecutor {
    store: Arc<dyn ResetStore>,
    timeout: Duration,
}

impl DailyResetExecutor {
    pub fn new(store: Arc<dyn ResetStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Execute the rollover for `day` and measure its duration.
    ///
    /// `now` is the instant the cycle started; it is forwarded to the store
    /// for archive timestamps so the whole cycle shares one clock reading.
    pub async fn execute(
        &self,
        day: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<ResetOutcome, ResetError> {
        let started = Instant::now();
        let counts = match tokio::time::timeout(self.timeout, self.store.rollover_day(day, now))
            .await
        {
            Err(_elapsed) => {
                return Err(ResetError::TimedOut {
                    limit_secs: self.timeout.as_secs(),
                })
            }
            Ok(Err(e)) => return Err(ResetError::Store(e)),
            Ok(Ok(counts)) => counts,
        };
        let duration_ms = started.elapsed().as_millis() as i64;
        Ok(ResetOutcome::from_counts(day, &counts, duration_ms))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
