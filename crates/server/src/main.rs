// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! duetd: the collaborative coding service daemon.
//!
//! Composition root: constructs each component once, wires them, serves
//! HTTP + WebSocket, and drives graceful shutdown on SIGTERM/SIGINT.

use duet_core::SystemClock;
use duet_sandbox::{DockerRunner, SandboxPool};
use duet_server::dispatch::{spawn_workers, DispatchConfig, Dispatcher};
use duet_server::env::Config;
use duet_server::http;
use duet_server::http::rate_limit::RateLimiter;
use duet_server::state::AppState;
use duet_server::supervisor;
use duet_server::ws;
use duet_storage::{JobStore, Journal, QueueStore, RoomStore, SnapshotStore};
use duet_sync::{PresenceTracker, SessionConfig, SyncSessions};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Room-create limit: 5 per 15 minutes per client address.
const CREATE_LIMIT: (usize, u64) = (5, 15 * 60 * 1000);

/// Room-join limit: 20 per minute per client address.
const JOIN_LIMIT: (usize, u64) = (20, 60 * 1000);

/// Worker drain budget on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> std::process::ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.state_dir) {
        eprintln!("cannot create state dir {}: {e}", config.state_dir.display());
        return std::process::ExitCode::FAILURE;
    }

    let log_appender =
        tracing_appender::rolling::daily(config.state_dir.join("logs"), "duetd.log");
    let (log_writer, _log_guard) = tracing_appender::non_blocking(log_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(log_writer)
        .with_ansi(false)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("cannot start runtime: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            eprintln!("fatal: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        state_dir = %config.state_dir.display(),
        port = config.port,
        "duetd starting"
    );

    let clock = SystemClock;
    let journal = Journal::open(&config.state_dir)?;

    let rooms = RoomStore::new(journal.clone(), clock.clone());
    let snapshots = SnapshotStore::new(journal.clone(), clock.clone());
    let jobs = JobStore::new(journal.clone(), clock.clone());
    let queue = QueueStore::new(journal.clone(), clock.clone());

    let runner = DockerRunner::new(
        config.sandbox_image.clone(),
        config.state_dir.join("sandboxes"),
    );
    let pool = Arc::new(SandboxPool::new(runner, clock.clone(), config.max_sandboxes));

    let dispatcher = Arc::new(Dispatcher::new(
        jobs,
        queue,
        pool,
        DispatchConfig {
            limits: config.limits.clone(),
            rate_limit_max: config.rate_limit_max,
            rate_limit_window_ms: config.rate_limit_window_ms,
            worker_count: config.worker_count,
        },
    ));

    let sessions = Arc::new(SyncSessions::new(
        rooms.clone(),
        snapshots.clone(),
        clock.clone(),
        SessionConfig::default(),
    ));
    let presence = Arc::new(PresenceTracker::new(clock.clone()));

    let config = Arc::new(config);
    let state = AppState {
        config: config.clone(),
        journal,
        rooms,
        snapshots,
        dispatcher: dispatcher.clone(),
        sessions,
        presence,
        clock: clock.clone(),
        create_limiter: Arc::new(RateLimiter::new(CREATE_LIMIT.0, CREATE_LIMIT.1, clock.clone())),
        join_limiter: Arc::new(RateLimiter::new(JOIN_LIMIT.0, JOIN_LIMIT.1, clock.clone())),
        ws_peers: Arc::new(ws::PeerRegistry::new()),
    };

    let shutdown = CancellationToken::new();
    let workers = spawn_workers(dispatcher.clone(), shutdown.clone());
    let supervisors = supervisor::spawn(state.clone(), shutdown.clone());

    let app = http::router::<DockerRunner, SystemClock>()
        .route(&config.ws_path, axum::routing::get(ws::ws_handler::<DockerRunner, SystemClock>))
        .with_state(state.clone());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, ws_path = %config.ws_path, "listening");
    if let Some(url) = &config.app_url {
        tracing::info!(app_url = %url, "external base url");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_signal(shutdown.clone()))
        .await?;

    supervisor::shutdown(&state, &dispatcher, workers, DRAIN_TIMEOUT).await;
    for handle in supervisors {
        handle.abort();
    }
    Ok(())
}

/// Resolve on SIGTERM or SIGINT, cancelling the shared token.
async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(term) => term,
            Err(e) => {
                tracing::error!(error = %e, "cannot install SIGTERM handler");
                let _ = ctrl_c.await;
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
    tracing::info!("shutdown signal received");
    shutdown.cancel();
}
