//! Activity-log boundary.
//!
//! The scheduler and cleanup record every state transition through this
//! trait; the JSONL writer lives in `qdk-audit` and the in-memory recorder in
//! `qdk-testkit`. Logging is advisory: callers warn on failure and keep
//! going, a broken audit sink must never block a reset.

use serde_json::Value;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

/// Actor id used for entries produced by the engine itself rather than an
/// operator session.
pub const SYSTEM_ACTOR_ID: i64 = 0;

/// Origin string for engine-initiated entries. [`normalize_origin`] maps it
/// (and anything else unparseable) to `0.0.0.0`.
pub const SYSTEM_ORIGIN: &str = "system";

// Action names, one per observable transition. Consumers filter on these
// strings, so they are part of the log format.
pub const ACTION_RESET_STARTED: &str = "daily_reset_started";
pub const ACTION_RESET_COMPLETED: &str = "daily_reset_completed";
pub const ACTION_RESET_NOOP: &str = "daily_reset_noop";
pub const ACTION_RESET_FAILED: &str = "daily_reset_failed";
pub const ACTION_RESET_SKIPPED: &str = "daily_reset_skipped";
pub const ACTION_RESET_LEDGER_WRITE_FAILED: &str = "daily_reset_ledger_write_failed";
pub const ACTION_MANUAL_RESET_TRIGGERED: &str = "manual_reset_triggered";
pub const ACTION_RECOVERY_SCHEDULED: &str = "daily_reset_recovery_scheduled";
pub const ACTION_RECOVERY_SUCCESS: &str = "daily_reset_recovery_success";
pub const ACTION_RECOVERY_FAILED: &str = "daily_reset_recovery_failed";
pub const ACTION_CLEANUP_COMPLETED: &str = "retention_cleanup_completed";
pub const ACTION_CLEANUP_FAILED: &str = "retention_cleanup_failed";
pub const ACTION_SCHEDULER_STARTED: &str = "scheduler_started";
pub const ACTION_SCHEDULER_STOPPED: &str = "scheduler_stopped";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// A failed activity-log write.
#[derive(Debug)]
pub struct ActivityError {
    pub message: String,
}

impl ActivityError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ActivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "activity log error: {}", self.message)
    }
}

impl std::error::Error for ActivityError {}

// ---------------------------------------------------------------------------
// Logger trait
// ---------------------------------------------------------------------------

/// Sink for structured activity entries.
///
/// `log` is synchronous: writers are expected to buffer or append locally.
/// Implementations must be `Send + Sync`; the scheduler calls this from
/// multiple tokio tasks.
pub trait ActivityLogger: Send + Sync {
    fn log(
        &self,
        actor_id: i64,
        action: &str,
        origin: &str,
        details: Value,
    ) -> Result<(), ActivityError>;
}

/// Normalize a raw origin string to an IP address.
///
/// Operator entries carry the caller's socket address; engine entries carry
/// [`SYSTEM_ORIGIN`]. Anything that does not parse as an IP collapses to
/// `0.0.0.0` so the log schema stays uniform.
pub fn normalize_origin(raw: &str) -> IpAddr {
    raw.trim()
        .parse::<IpAddr>()
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
