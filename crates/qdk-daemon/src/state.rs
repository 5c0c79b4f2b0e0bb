//! Shared runtime state for qdk-daemon.
//!
//! All types here are `Clone`-able (via `Arc` or copy). Handlers receive
//! `State<Arc<AppState>>` from Axum; this module owns nothing async itself.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use qdk_reset::{ActivityLogger, ResetScheduler, ResetStore};
use qdk_schemas::ResetEvent;

// ---------------------------------------------------------------------------
// BusMsg
// ---------------------------------------------------------------------------

/// Messages broadcast over the internal event bus and surfaced as SSE events.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    Heartbeat { ts_millis: i64 },
    ResetCompleted(ResetEvent),
    LogLine { level: String, msg: String },
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    /// Static build metadata.
    pub build: BuildInfo,
    /// Midnight reset engine; owns the cycle state machine and the timer.
    pub scheduler: Arc<ResetScheduler>,
    /// Queue persistence used by the read routes.
    pub store: Arc<dyn ResetStore>,
    /// Operator action audit sink.
    pub activity: Arc<dyn ActivityLogger>,
    /// SHA-256 of the canonical merged config this process booted with.
    pub config_hash: String,
}

impl AppState {
    pub fn new(
        scheduler: Arc<ResetScheduler>,
        store: Arc<dyn ResetStore>,
        activity: Arc<dyn ActivityLogger>,
        config_hash: String,
    ) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);

        Self {
            bus,
            build: BuildInfo {
                service: "qdk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            scheduler,
            store,
            activity,
            config_hash,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn a background task that emits a heartbeat SSE every `interval`.
pub fn spawn_heartbeat(bus: broadcast::Sender<BusMsg>, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let ts = chrono::Utc::now().timestamp_millis();
            let _ = bus.send(BusMsg::Heartbeat { ts_millis: ts });
        }
    });
}

/// Spawn a background task that forwards reset outcomes from the scheduler's
/// event channel onto the SSE bus, so connected displays refresh their queue
/// view the moment a rollover lands instead of polling for it.
pub fn spawn_reset_forwarder(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut rx = state.scheduler.subscribe();
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let _ = state.bus.send(BusMsg::ResetCompleted(event));
                }
                // Resets are rare; a lagged receiver just skips to the newest.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
