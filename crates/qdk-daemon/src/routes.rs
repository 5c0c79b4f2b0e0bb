//! Axum router and all HTTP handlers for qdk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers.  All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use qdk_reset::{activity, TriggerError};

use crate::{
    api_types::{
        ErrorResponse, HealthResponse, QueueResponse, SchedulerControlResponse, StatusResponse,
        TriggerRefusedResponse,
    },
    state::{uptime_secs, AppState, BusMsg},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/queue", get(queue))
        .route("/v1/stream", get(stream))
        .route("/v1/reset/trigger", post(reset_trigger))
        .route("/v1/scheduler/start", post(scheduler_start))
        .route("/v1/scheduler/stop", post(scheduler_stop))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(StatusResponse {
            scheduler: st.scheduler.status(),
            daemon_uptime_secs: uptime_secs(),
            config_hash: st.config_hash.clone(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/queue
// ---------------------------------------------------------------------------

/// Live queue in display order.
///
/// Ordering is computed here, not in SQL: serving first, then manual pins by
/// slot, then priority classes by weight, then arrival. The display client
/// renders the list verbatim.
pub(crate) async fn queue(State(st): State<Arc<AppState>>) -> Response {
    let rows = match st.store.fetch_live_queue().await {
        Ok(rows) => rows,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("QUEUE_UNAVAILABLE: {e}"),
                }),
            )
                .into_response();
        }
    };

    let customers = qdk_ordering::order_queue(rows);
    (
        StatusCode::OK,
        Json(QueueResponse {
            count: customers.len(),
            customers,
        }),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/reset/trigger
// ---------------------------------------------------------------------------

/// Run a manual reset cycle right now.
///
/// Returns `409 Conflict` while a cycle is running or a recovery attempt is
/// armed; the engine never runs two rollovers concurrently. A manual failure
/// is reported synchronously with `500` and arms no recovery.
pub(crate) async fn reset_trigger(
    State(st): State<Arc<AppState>>,
    connect: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    // ConnectInfo is absent when the router is driven in-process (tests).
    let origin = connect
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    // The route records who asked; the engine records what happened.
    if let Err(e) = st.activity.log(
        activity::SYSTEM_ACTOR_ID,
        activity::ACTION_MANUAL_RESET_TRIGGERED,
        &origin,
        serde_json::json!({}),
    ) {
        warn!(error = %e, "activity log write failed");
    }

    info!(%origin, "reset/trigger");

    match st.scheduler.trigger_manual_reset().await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(TriggerError::Busy { phase }) => (
            StatusCode::CONFLICT,
            Json(TriggerRefusedResponse {
                error: format!("RESET_REFUSED: a cycle is already {phase}"),
                phase: phase.as_str().to_string(),
            }),
        )
            .into_response(),
        Err(TriggerError::Execution(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/scheduler/start
// ---------------------------------------------------------------------------

pub(crate) async fn scheduler_start(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    st.scheduler.start();

    info!("scheduler/start");
    let _ = st.bus.send(BusMsg::LogLine {
        level: "INFO".to_string(),
        msg: "midnight scheduler armed".to_string(),
    });

    (
        StatusCode::OK,
        Json(SchedulerControlResponse {
            is_scheduled: st.scheduler.is_scheduled(),
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/scheduler/stop
// ---------------------------------------------------------------------------

pub(crate) async fn scheduler_stop(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    st.scheduler.stop();

    info!("scheduler/stop");
    let _ = st.bus.send(BusMsg::LogLine {
        level: "WARN".to_string(),
        msg: "midnight scheduler STOPPED; queue will not reset automatically".to_string(),
    });

    (
        StatusCode::OK,
        Json(SchedulerControlResponse {
            is_scheduled: st.scheduler.is_scheduled(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<BusMsg>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(m) => {
                let event_name = match &m {
                    BusMsg::Heartbeat { .. } => "heartbeat",
                    BusMsg::ResetCompleted(_) => "reset_completed",
                    BusMsg::LogLine { .. } => "log",
                };
                let data = serde_json::to_string(&m).ok()?;
                Some(Ok(Event::default().event(event_name).data(data)))
            }
            Err(_) => None, // lagged / closed
        }
    })
}
