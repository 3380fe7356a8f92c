// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! HTTP control surface.

pub mod error;
pub mod health;
pub mod jobs;
pub mod rate_limit;
pub mod rooms;

use crate::state::AppState;
use axum::routing::{get, post, put};
use axum::Router;
use duet_core::Clock;
use duet_sandbox::SandboxRunner;

/// Assemble the HTTP routes (WebSocket endpoint and state applied by
/// the composition root).
pub fn router<R: SandboxRunner, C: Clock + 'static>() -> Router<AppState<R, C>> {
    Router::new()
        .route("/rooms", post(rooms::create_room))
        .route("/rooms/join", post(rooms::join_room))
        .route("/rooms/leave", post(rooms::leave_room))
        .route("/rooms/:room_id", get(rooms::get_room).put(rooms::update_room))
        .route("/rooms/:room_id/participants", get(rooms::get_participants))
        .route("/rooms/:room_id/cursor", put(rooms::update_cursor))
        .route("/compile", post(jobs::submit))
        .route("/compile/:job_id", get(jobs::status).delete(jobs::cancel))
        .route("/health/db", get(health::db))
        .route("/health/queue", get(health::queue))
}
