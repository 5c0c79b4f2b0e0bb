//! Retention cleanup.
//!
//! Periodic purge of history rows older than the retention window. Runs on
//! its own ticker, fully independent of the reset scheduler: a failed purge
//! is logged and audited but never touches the reset cycle, and the next
//! tick always runs.

use crate::activity::{self, ActivityLogger};
use crate::clock;
use crate::store::{ResetStore, StoreError};
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use chrono_tz::Tz;
use qdk_schemas::PurgeCounts;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Cleanup knobs, filled from the `cleanup` and `queue` config sections.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Shop timezone; the cutoff is computed from the local queue day.
    pub timezone: Tz,
    /// Pause between passes. The first pass runs at spawn.
    pub interval: Duration,
    /// History rows strictly older than this many days are deleted.
    pub retention_days: i64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            timezone: chrono_tz::Asia::Manila,
            interval: Duration::from_secs(168 * 3600),
            retention_days: 365,
        }
    }
}

pub struct RetentionCleanup {
    store: Arc<dyn ResetStore>,
    activity: Arc<dyn ActivityLogger>,
    config: CleanupConfig,
}

impl RetentionCleanup {
    pub fn new(
        store: Arc<dyn ResetStore>,
        activity: Arc<dyn ActivityLogger>,
        config: CleanupConfig,
    ) -> Self {
        Self {
            store,
            activity,
            config,
        }
    }

    /// One purge pass with the cutoff anchored at `today`.
    ///
    /// Rows dated exactly `today - retention_days` are kept; only strictly
    /// older rows go.
    pub async fn run_once(&self, today: NaiveDate) -> Result<PurgeCounts, StoreError> {
        let cutoff = today - ChronoDuration::days(self.config.retention_days);
        match self.store.purge_history_before(cutoff).await {
            Ok(counts) => {
                info!(
                    %cutoff,
                    snapshots = counts.snapshots,
                    customer_records = counts.customer_records,
                    reset_log = counts.reset_log,
                    "retention cleanup completed"
                );
                self.audit(
                    activity::ACTION_CLEANUP_COMPLETED,
                    json!({
                        "cutoff": cutoff,
                        "snapshots": counts.snapshots,
                        "customer_records": counts.customer_records,
                        "reset_log": counts.reset_log,
                    }),
                );
                Ok(counts)
            }
            Err(e) => {
                warn!(%cutoff, error = %e, "retention cleanup failed");
                self.audit(
                    activity::ACTION_CLEANUP_FAILED,
                    json!({ "cutoff": cutoff, "error": e.to_string() }),
                );
                Err(e)
            }
        }
    }

    /// Spawn the periodic ticker. The first tick fires immediately, then one
    /// pass per configured interval.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            loop {
                ticker.tick().await;
                let today = clock::local_day(Utc::now(), self.config.timezone);
                // Errors are already logged and audited inside run_once.
                let _ = self.run_once(today).await;
            }
        })
    }

    fn audit(&self, action: &str, details: serde_json::Value) {
        if let Err(e) = self
            .activity
            .log(activity::SYSTEM_ACTOR_ID, action, activity::SYSTEM_ORIGIN, details)
        {
            warn!(action, error = %e, "activity log write failed");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
