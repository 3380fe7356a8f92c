// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Health probes.

use crate::dispatch::QUEUE_SATURATION;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use duet_core::Clock;
use duet_sandbox::SandboxRunner;
use serde_json::{json, Value};

/// GET /health/db — journal reachable and its directory writable.
pub async fn db<R: SandboxRunner, C: Clock + 'static>(
    State(state): State<AppState<R, C>>,
) -> (StatusCode, Json<Value>) {
    let (rooms, jobs) = state.journal.read(|s| (s.rooms.len(), s.jobs.len()));

    let probe = state.config.state_dir.join(".health-probe");
    let writable = std::fs::write(&probe, b"ok").is_ok();
    let _ = std::fs::remove_file(&probe);

    if writable {
        (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "rooms": rooms, "jobs": jobs })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "reason": "state directory not writable" })),
        )
    }
}

/// GET /health/queue — queue depth and sandbox pool load.
pub async fn queue<R: SandboxRunner, C: Clock + 'static>(
    State(state): State<AppState<R, C>>,
) -> (StatusCode, Json<Value>) {
    let stats = state.dispatcher.queue_stats();
    let live = state.dispatcher.pool().live_count();
    let load = stats.waiting + stats.active;

    let body = json!({
        "status": if load < QUEUE_SATURATION { "healthy" } else { "saturated" },
        "stats": stats,
        "liveSandboxes": live,
    });
    if load < QUEUE_SATURATION {
        (StatusCode::OK, Json(body))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}
