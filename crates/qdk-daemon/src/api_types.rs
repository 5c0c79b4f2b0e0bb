//! Request and response types for all qdk-daemon HTTP endpoints.
//!
//! These types are JSON-encoded by Axum and decoded by tests and the desk
//! display client. No business logic lives here.

use serde::{Deserialize, Serialize};

use qdk_reset::SchedulerStatus;
use qdk_schemas::Customer;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// /v1/status
// ---------------------------------------------------------------------------

/// Combined daemon + scheduler snapshot returned by GET /v1/status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub scheduler: SchedulerStatus,
    pub daemon_uptime_secs: u64,
    /// SHA-256 of the canonical merged config; lets an operator confirm which
    /// config layering a running instance actually loaded.
    pub config_hash: String,
}

// ---------------------------------------------------------------------------
// /v1/queue
// ---------------------------------------------------------------------------

/// Live queue in display order (serving first, then pins, then priority).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueResponse {
    pub count: usize,
    pub customers: Vec<Customer>,
}

// ---------------------------------------------------------------------------
// /v1/reset/trigger refusal (409)
// ---------------------------------------------------------------------------

/// Response body when a manual reset is refused because a cycle is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRefusedResponse {
    pub error: String,
    /// Phase the cycle was in when the trigger arrived: "running" | "recovery_pending"
    pub phase: String,
}

/// Plain error body for 500 responses (store unavailable, reset failed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// /v1/scheduler/start  /v1/scheduler/stop
// ---------------------------------------------------------------------------

/// Response for scheduler start / stop endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerControlResponse {
    /// true = a midnight loop is armed and will fire at the next boundary.
    pub is_scheduled: bool,
}
