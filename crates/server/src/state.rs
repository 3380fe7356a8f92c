// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Shared handler state.

use crate::dispatch::Dispatcher;
use crate::env::Config;
use crate::http::rate_limit::RateLimiter;
use duet_core::Clock;
use duet_storage::{Journal, RoomStore, SnapshotStore};
use duet_sync::{PresenceTracker, SyncSessions};
use std::sync::Arc;

/// Everything the control surface needs, cheaply cloneable.
///
/// Stateless adapters only: all long-lived state lives in the stores,
/// the session manager, and the pool behind these handles.
pub struct AppState<R, C: Clock> {
    pub config: Arc<Config>,
    pub journal: Journal,
    pub rooms: RoomStore<C>,
    pub snapshots: SnapshotStore<C>,
    pub dispatcher: Arc<Dispatcher<R, C>>,
    pub sessions: Arc<SyncSessions<C>>,
    pub presence: Arc<PresenceTracker<C>>,
    pub clock: C,
    /// Per-client-address limiter for room create.
    pub create_limiter: Arc<RateLimiter<C>>,
    /// Per-client-address limiter for room join.
    pub join_limiter: Arc<RateLimiter<C>>,
    /// Connected sockets per room, for presence fan-out.
    pub ws_peers: Arc<crate::ws::PeerRegistry>,
}

impl<R, C: Clock> Clone for AppState<R, C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            journal: self.journal.clone(),
            rooms: self.rooms.clone(),
            snapshots: self.snapshots.clone(),
            dispatcher: self.dispatcher.clone(),
            sessions: self.sessions.clone(),
            presence: self.presence.clone(),
            clock: self.clock.clone(),
            create_limiter: self.create_limiter.clone(),
            join_limiter: self.join_limiter.clone(),
            ws_peers: self.ws_peers.clone(),
        }
    }
}
