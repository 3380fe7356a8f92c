// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Shared fixtures for server tests.

use crate::dispatch::{DispatchConfig, Dispatcher};
use crate::http::rate_limit::RateLimiter;
use crate::state::AppState;
use crate::ws::PeerRegistry;
use async_trait::async_trait;
use duet_core::{ExecOptions, ExecResult, FakeClock, JobId};
use duet_sandbox::{SandboxPool, SandboxRunner};
use duet_storage::{JobStore, Journal, QueueStore, RoomStore, SnapshotStore};
use duet_sync::{PresenceTracker, SessionConfig, SyncSessions};
use std::sync::Arc;

/// Runner that "compiles" instantly and echoes Hello.
pub(crate) struct NullRunner;

#[async_trait]
impl SandboxRunner for NullRunner {
    async fn run(&self, _job_id: &JobId, _code: &str, _options: &ExecOptions) -> ExecResult {
        ExecResult {
            success: true,
            stdout: "Hello".into(),
            exit_code: Some(0),
            execution_time_ms: 5,
            ..ExecResult::default()
        }
    }
    async fn kill(&self, _job_id: &JobId) {}
}

pub(crate) struct TestState {
    pub _dir: tempfile::TempDir,
    pub state: AppState<NullRunner, FakeClock>,
    pub clock: FakeClock,
}

/// A fully wired AppState over a temp journal and the null runner.
pub(crate) fn test_state() -> TestState {
    let dir = tempfile::tempdir().expect("tempdir");
    let journal = Journal::open(dir.path()).expect("journal");
    let clock = FakeClock::new();
    let rooms = RoomStore::new(journal.clone(), clock.clone());
    let snapshots = SnapshotStore::new(journal.clone(), clock.clone());
    let jobs = JobStore::new(journal.clone(), clock.clone());
    let queue = QueueStore::new(journal.clone(), clock.clone());
    let pool = Arc::new(SandboxPool::new(NullRunner, clock.clone(), 5));
    let dispatcher = Arc::new(Dispatcher::new(jobs, queue, pool, DispatchConfig::default()));
    let sessions = Arc::new(SyncSessions::new(
        rooms.clone(),
        snapshots.clone(),
        clock.clone(),
        SessionConfig::default(),
    ));
    let config = Arc::new(crate::env::Config {
        state_dir: dir.path().to_path_buf(),
        port: 0,
        app_url: None,
        ws_path: "/ws".into(),
        limits: duet_core::ExecLimits::default(),
        max_memory_limit: "128m".into(),
        rate_limit_max: 5,
        rate_limit_window_ms: 60_000,
        sandbox_image: "gcc:13".into(),
        max_sandboxes: 5,
        worker_count: 3,
    });
    let state = AppState {
        config,
        journal,
        rooms,
        snapshots,
        dispatcher,
        sessions,
        presence: Arc::new(PresenceTracker::new(clock.clone())),
        clock: clock.clone(),
        create_limiter: Arc::new(RateLimiter::new(5, 15 * 60 * 1000, clock.clone())),
        join_limiter: Arc::new(RateLimiter::new(20, 60 * 1000, clock.clone())),
        ws_peers: Arc::new(PeerRegistry::new()),
    };
    TestState { _dir: dir, state, clock }
}
