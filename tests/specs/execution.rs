// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! End-to-end execution flow: admission → queue → worker lanes →
//! terminal job states.

use async_trait::async_trait;
use duet_core::{ExecOptions, ExecResult, FakeClock, JobId, JobState, OptionsPatch};
use duet_sandbox::{SandboxPool, SandboxRunner};
use duet_server::dispatch::{spawn_workers, DispatchConfig, Dispatcher};
use duet_storage::{JobStore, Journal, QueueStore, RoomStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct EchoRunner;

#[async_trait]
impl SandboxRunner for EchoRunner {
    async fn run(&self, _job_id: &JobId, code: &str, options: &ExecOptions) -> ExecResult {
        if code.contains("while(1)") {
            return ExecResult {
                success: false,
                timed_out: true,
                execution_time_ms: options.wall_timeout_ms,
                ..ExecResult::default()
            };
        }
        ExecResult {
            success: true,
            stdout: "Hello".into(),
            exit_code: Some(0),
            execution_time_ms: 10,
            ..ExecResult::default()
        }
    }
    async fn kill(&self, _job_id: &JobId) {}
}

struct Env {
    _dir: tempfile::TempDir,
    dispatcher: Arc<Dispatcher<EchoRunner, FakeClock>>,
    rooms: RoomStore<FakeClock>,
}

fn build() -> Env {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::open(dir.path()).unwrap();
    let clock = FakeClock::new();
    let rooms = RoomStore::new(journal.clone(), clock.clone());
    let jobs = JobStore::new(journal.clone(), clock.clone());
    let queue = QueueStore::new(journal, clock.clone());
    let pool = Arc::new(SandboxPool::new(EchoRunner, clock.clone(), 5));
    let dispatcher = Arc::new(Dispatcher::new(jobs, queue, pool, DispatchConfig::default()));
    Env { _dir: dir, dispatcher, rooms }
}

async fn wait_terminal(env: &Env, id: &JobId) -> JobState {
    for _ in 0..200 {
        if let Some(status) = env.dispatcher.job_status(id) {
            if status.state.is_terminal() {
                return status.state;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached a terminal state");
}

#[tokio::test]
async fn submitted_jobs_run_to_completion_through_worker_lanes() {
    let env = build();
    let room = env.rooms.create().unwrap();

    let shutdown = CancellationToken::new();
    let workers = spawn_workers(env.dispatcher.clone(), shutdown.clone());

    let hello = env
        .dispatcher
        .queue_job(
            room.id,
            "alice",
            "#include<iostream>\nint main(){std::cout<<\"Hello\";return 0;}",
            OptionsPatch::default(),
        )
        .unwrap();
    let looping = env
        .dispatcher
        .queue_job(
            room.id,
            "bob",
            "int main(){while(1);}",
            OptionsPatch { wall_timeout_ms: Some(3_000), ..OptionsPatch::default() },
        )
        .unwrap();

    assert_eq!(wait_terminal(&env, &hello).await, JobState::Completed);
    assert_eq!(wait_terminal(&env, &looping).await, JobState::Timeout);

    let done = env.dispatcher.job_status(&hello).unwrap().result.unwrap();
    assert_eq!(done.stdout, "Hello");
    assert_eq!(done.exit_code, Some(0));

    let timed = env.dispatcher.job_status(&looping).unwrap().result.unwrap();
    assert!(timed.timed_out);
    assert!(timed.execution_time_ms.unwrap() >= 3_000);

    shutdown.cancel();
    for handle in workers {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn cancellation_beats_dispatch_and_sandbox_is_never_started() {
    let env = build();
    let room = env.rooms.create().unwrap();
    let mut events = env.dispatcher.pool().subscribe();

    let job = env
        .dispatcher
        .queue_job(room.id, "alice", "int main(){}", OptionsPatch::default())
        .unwrap();
    assert!(env.dispatcher.cancel_job(&job, "alice").unwrap());

    // Start workers only after the cancel landed
    let shutdown = CancellationToken::new();
    let workers = spawn_workers(env.dispatcher.clone(), shutdown.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();
    for handle in workers {
        handle.await.unwrap();
    }

    assert_eq!(env.dispatcher.job_status(&job).unwrap().state, JobState::Cancelled);
    assert!(events.try_recv().is_err(), "no sandbox lifecycle events recorded");
}
