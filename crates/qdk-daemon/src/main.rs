//! qdk-daemon entry point.
//!
//! This file is intentionally thin: it loads config, connects Postgres and
//! runs migrations, arms the reset scheduler and the retention sweep, wires
//! middleware, and starts the HTTP server.  All route handlers live in
//! `routes.rs`; all shared state types live in `state.rs`.

use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use qdk_audit::ActivityLog;
use qdk_daemon::{routes, state};
use qdk_db::PgQueueStore;
use qdk_reset::{
    ActivityLogger, CleanupConfig, ResetScheduler, ResetStore, RetentionCleanup, SchedulerConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let paths = config_paths();
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let (loaded, cfg) = qdk_config::load_app_config(&path_refs).context("config load failed")?;
    info!(config_hash = %loaded.config_hash, files = ?paths, "config loaded");

    let pool = qdk_db::connect_from_env().await?;
    qdk_db::migrate(&pool).await?;

    let store: Arc<dyn ResetStore> = Arc::new(PgQueueStore::new(pool));
    let activity: Arc<dyn ActivityLogger> = Arc::new(ActivityLog::new(&cfg.audit.log_path)?);

    let scheduler = Arc::new(ResetScheduler::new(
        Arc::clone(&store),
        Arc::clone(&activity),
        SchedulerConfig {
            timezone: cfg.timezone()?,
            recovery_delay: cfg.recovery_delay(),
            execute_timeout: cfg.execute_timeout(),
            enabled: cfg.reset.enabled,
        },
    ));
    scheduler.start();

    let cleanup = Arc::new(RetentionCleanup::new(
        Arc::clone(&store),
        Arc::clone(&activity),
        CleanupConfig {
            timezone: cfg.timezone()?,
            interval: cfg.cleanup_interval(),
            retention_days: cfg.cleanup.retention_days,
        },
    ));
    let _retention_task = cleanup.spawn();

    let shared = Arc::new(state::AppState::new(
        scheduler,
        store,
        activity,
        loaded.config_hash,
    ));

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));
    state::spawn_reset_forwarder(Arc::clone(&shared));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = match bind_addr_from_env() {
        Some(addr) => addr,
        None => cfg.bind_addr()?,
    };
    info!("qdk-daemon listening on http://{}", addr);

    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        // ConnectInfo feeds the caller address into the manual-reset audit.
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

/// Config layering: `QDK_CONFIG` holds a comma-separated path list; without
/// it, `config/base.yaml` then `config/local.yaml` are used where present.
fn config_paths() -> Vec<String> {
    if let Ok(list) = std::env::var("QDK_CONFIG") {
        return list
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
    }
    ["config/base.yaml", "config/local.yaml"]
        .iter()
        .filter(|p| Path::new(p).exists())
        .map(|p| p.to_string())
        .collect()
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("QDK_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
        "http://localhost:1420",
        "http://127.0.0.1:1420",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
